//! Agent storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database

mod memory;
mod sqlite;

pub use memory::InMemoryAgentStore;
pub use sqlite::SqliteAgentStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::agents::{Agent, AgentId, AgentType, Capability, PerformanceMetrics};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Persisted agent row. The type is kept as the raw stored string so rows
/// written by other versions still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub agent_type: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub is_active: bool,
    pub performance: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Typed view of the record, or `None` if the stored type is unknown.
    pub fn to_agent(&self) -> Option<Agent> {
        let agent_type: AgentType = self.agent_type.parse().ok()?;
        Some(Agent {
            id: self.id,
            name: self.name.clone(),
            agent_type,
            description: self.description.clone(),
            version: self.version.clone(),
            capabilities: self.capabilities.clone(),
            is_active: self.is_active,
            performance: self.performance.clone(),
            created_at: self.created_at,
        })
    }
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            agent_type: agent.agent_type.as_str().to_string(),
            description: agent.description.clone(),
            version: agent.version.clone(),
            capabilities: agent.capabilities.clone(),
            is_active: agent.is_active,
            performance: agent.performance.clone(),
            created_at: agent.created_at,
        }
    }
}

/// Encrypted provider credential owned by one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub provider: String,
    pub key_name: String,
    /// Vault ciphertext, never plaintext.
    pub encrypted_value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub monthly_limit: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedAgent {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub assigned_at: DateTime<Utc>,
}

/// The slice of a user goal the agent layer reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub assigned_agents: Vec<AssignedAgent>,
    pub last_agent_update: Option<DateTime<Utc>>,
}

impl GoalRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            title: title.into(),
            assigned_agents: Vec::new(),
            last_agent_update: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl MonitorFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    Above,
    Below,
    Change,
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::Change => "change",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "above" => Some(Self::Above),
            "below" => Some(Self::Below),
            "change" => Some(Self::Change),
            _ => None,
        }
    }
}

/// A stored monitoring request. Nothing schedules it; it is recorded only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRecord {
    pub id: Uuid,
    pub goal_id: String,
    pub user_id: String,
    pub agent_id: AgentId,
    pub task_type: String,
    pub parameters: Value,
    pub frequency: MonitorFrequency,
    pub threshold: Option<f64>,
    pub threshold_type: Option<ThresholdType>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One finished task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionRecord {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub goal_id: String,
    pub user_id: String,
    pub task_type: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub confidence: f64,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Persistence boundary for the agent manager.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Whether this store survives a restart.
    fn is_persistent(&self) -> bool;

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError>;

    async fn list_active_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        Ok(self
            .list_agents()
            .await?
            .into_iter()
            .filter(|a| a.is_active)
            .collect())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>, StoreError>;

    async fn insert_agent(&self, agent: &AgentRecord) -> Result<(), StoreError>;

    async fn update_performance(
        &self,
        id: AgentId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError>;

    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<(), StoreError>;

    async fn insert_credential(&self, credential: &CredentialRecord) -> Result<(), StoreError>;

    /// Active credentials of one agent, oldest first.
    async fn list_active_credentials(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<CredentialRecord>, StoreError>;

    async fn get_goal(&self, id: &str) -> Result<Option<GoalRecord>, StoreError>;

    async fn save_goal(&self, goal: &GoalRecord) -> Result<(), StoreError>;

    async fn insert_monitor(&self, monitor: &MonitorRecord) -> Result<(), StoreError>;

    async fn list_monitors(&self, goal_id: &str) -> Result<Vec<MonitorRecord>, StoreError>;

    async fn record_execution(&self, record: &TaskExecutionRecord) -> Result<(), StoreError>;

    /// Most recent executions of one agent, newest first.
    async fn list_executions(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_agent_type_has_no_typed_view() {
        let agent = Agent::new("Travel", AgentType::Travel, "trips", Vec::new());
        let mut record = AgentRecord::from(&agent);
        assert_eq!(record.to_agent().map(|a| a.agent_type), Some(AgentType::Travel));

        record.agent_type = "fitness".to_string();
        assert!(record.to_agent().is_none());
    }
}
