//! Core types for the agent system.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Create a new unique agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for AgentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain an agent serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Travel,
    Financial,
    Research,
    Learning,
    Weather,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Travel,
        AgentType::Financial,
        AgentType::Research,
        AgentType::Learning,
        AgentType::Weather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Travel => "travel",
            Self::Financial => "financial",
            Self::Research => "research",
            Self::Learning => "learning",
            Self::Weather => "weather",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "travel" => Ok(Self::Travel),
            "financial" => Ok(Self::Financial),
            "research" => Ok(Self::Research),
            "learning" => Ok(Self::Learning),
            "weather" => Ok(Self::Weather),
            other => Err(AgentError::UnknownAgentType(other.to_string())),
        }
    }
}

/// JSON type of a capability parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Descriptor for a single capability parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            default: None,
        }
    }

    pub fn with_default(param_type: ParamType, default: Value) -> Self {
        Self {
            param_type,
            required: false,
            default: Some(default),
        }
    }
}

/// One named operation an agent supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }
}

/// Rolling execution statistics for an agent.
///
/// # Invariants
/// - `success_rate` is in [0, 1]
/// - `average_response_time_ms` is the mean of all recorded samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_executions: u64,
    pub average_response_time_ms: f64,
    pub success_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    /// Fold one sample into the running averages, weighting the old value by
    /// the previous execution count.
    pub fn record(&mut self, duration_ms: f64, success: bool, at: DateTime<Utc>) {
        let count = self.total_executions as f64;
        let outcome = if success { 1.0 } else { 0.0 };

        self.average_response_time_ms =
            (self.average_response_time_ms * count + duration_ms) / (count + 1.0);
        self.success_rate = (self.success_rate * count + outcome) / (count + 1.0);
        self.total_executions += 1;
        self.last_execution = Some(at);
    }
}

/// A registered agent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub is_active: bool,
    pub performance: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        agent_type: AgentType,
        description: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            agent_type,
            description: description.into(),
            version: "1.0.0".to_string(),
            capabilities,
            is_active: true,
            performance: PerformanceMetrics::default(),
            created_at: Utc::now(),
        }
    }
}

/// Structured metadata attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// True when any part of the payload came from synthetic data.
    #[serde(default)]
    pub fallback: bool,
    /// Providers that answered, or "synthetic".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<String>,
}

/// Uniform response envelope for every task execution.
///
/// # Invariants
/// - `confidence` is in [0, 1]
/// - `success == false` implies `confidence == 0` and `error.is_some()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub data: Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// Create a successful result.
    pub fn success(data: Value, confidence: f64) -> Self {
        Self {
            success: true,
            data,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: None,
            error: None,
        }
    }

    /// Create a failure result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            confidence: 0.0,
            metadata: None,
            error: Some(error.into()),
        }
    }

    /// Mark the payload as (partly) synthetic.
    pub fn with_sources(mut self, sources: Vec<String>, fallback: bool) -> Self {
        let metadata = self.metadata.get_or_insert_with(ResultMetadata::default);
        metadata.fallback = fallback;
        metadata.data_sources = sources;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.as_ref().map(|m| m.fallback).unwrap_or(false)
    }
}

/// Errors that can occur in agent operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unsupported task type for {agent} agent: {task_type}")]
    UnsupportedTask { agent: AgentType, task_type: String },

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("No suitable agent found for task type: {0}")]
    NoSuitableAgent(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metrics_match_closed_form() {
        let samples = [(120.0, true), (80.0, false), (200.0, true), (40.0, true)];
        let mut metrics = PerformanceMetrics::default();
        for (duration, success) in samples {
            metrics.record(duration, success, Utc::now());
        }

        let expected_avg = samples.iter().map(|(d, _)| d).sum::<f64>() / samples.len() as f64;
        let expected_rate =
            samples.iter().filter(|(_, s)| *s).count() as f64 / samples.len() as f64;

        assert_eq!(metrics.total_executions, 4);
        assert!((metrics.average_response_time_ms - expected_avg).abs() < 1e-9);
        assert!((metrics.success_rate - expected_rate).abs() < 1e-9);
        assert!(metrics.last_execution.is_some());
    }

    #[test]
    fn test_metrics_first_sample() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record(55.0, false, Utc::now());
        assert_eq!(metrics.average_response_time_ms, 55.0);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[test]
    fn test_agent_type_parse() {
        assert_eq!("Travel".parse::<AgentType>().unwrap(), AgentType::Travel);
        assert_eq!(" weather ".parse::<AgentType>().unwrap(), AgentType::Weather);
        assert!(matches!(
            "fitness".parse::<AgentType>(),
            Err(AgentError::UnknownAgentType(_))
        ));
    }

    #[test]
    fn test_failure_result_has_zero_confidence() {
        let result = AgentResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_confidence_is_clamped() {
        let result = AgentResult::success(json!({}), 1.7);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_capability_serializes_param_specs() {
        let capability = Capability::new("convertCurrency", "Convert money")
            .param("amount", ParamSpec::required(ParamType::Number))
            .param("fee", ParamSpec::with_default(ParamType::Number, json!(2)));

        let value = serde_json::to_value(&capability).unwrap();
        assert_eq!(value["parameters"]["amount"]["type"], "number");
        assert_eq!(value["parameters"]["amount"]["required"], true);
        assert_eq!(value["parameters"]["fee"]["default"], 2);
    }
}
