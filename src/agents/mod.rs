//! Agents module - the five domain agents and their shared contract.
//!
//! # Agent Types
//! - **TravelAgent**: flights, hotels, visa rules, itineraries
//! - **FinancialAgent**: currency conversion, savings plans, investment advice, budgets
//! - **ResearchAgent**: market research, competitors, news, SWOT; also the default
//!   for task types with no fixed mapping
//! - **LearningAgent**: learning paths, course discovery, study schedules
//! - **WeatherAgent**: current conditions, forecasts, trip weather
//!
//! # Design Principles
//! - One trait ([`DomainAgent`]) for every domain; the manager never downcasts
//! - External data always goes through a [`crate::cascade::Cascade`], so a handler
//!   returns data even when every provider is down
//! - Invalid input is the only in-band failure an agent reports

mod credentials;
mod types;

pub mod financial;
pub mod learning;
pub mod research;
pub mod travel;
pub mod weather;

pub use credentials::{Credential, CredentialSet, SharedKeys};
pub use financial::FinancialAgent;
pub use learning::LearningAgent;
pub use research::ResearchAgent;
pub use travel::TravelAgent;
pub use types::{
    Agent, AgentError, AgentId, AgentResult, AgentType, Capability, ParamSpec, ParamType,
    PerformanceMetrics, ResultMetadata,
};
pub use weather::WeatherAgent;

use async_trait::async_trait;
use serde_json::Value;

use crate::cascade::Retrieved;
use crate::task::{Task, TaskParams};

/// The capability contract every domain agent implements.
///
/// # Invariants
/// - `execute_task()` returns `Err` only for structural problems (bad
///   parameters, a task type this agent does not serve); provider outages are
///   absorbed by the agent's cascades
/// - credentials change only through `set_api_credentials()`
#[async_trait]
pub trait DomainAgent: Send + Sync {
    /// Domain served by this implementation.
    fn agent_type(&self) -> AgentType;

    /// Static list of supported task names with parameter descriptors.
    fn capabilities(&self) -> Vec<Capability>;

    /// Check that `parameters` is an object that parses into the typed
    /// parameters of a task this agent serves.
    fn validate_parameters(&self, task_type: &str, parameters: &Value) -> bool {
        match TaskParams::parse(task_type, parameters) {
            Ok(params) => match params.kind() {
                Some(kind) => kind.agent_type() == self.agent_type(),
                None => self.agent_type() == AgentType::Research,
            },
            Err(_) => false,
        }
    }

    /// Run one task. The sole side-effecting entry point.
    async fn execute_task(&self, task: &Task) -> Result<AgentResult, AgentError>;

    /// Install or replace the credential for `provider`.
    fn set_api_credentials(&mut self, provider: &str, credential: Credential);

    fn api_credentials(&self, provider: &str) -> Option<&Credential>;
}

/// Records which data sources answered while a handler runs.
#[derive(Debug, Default)]
pub(crate) struct Provenance {
    sources: Vec<String>,
    fallback: bool,
}

impl Provenance {
    pub(crate) fn note<T>(&mut self, retrieved: &Retrieved<T>) {
        let label = retrieved.source.label();
        if !self.sources.iter().any(|s| s == label) {
            self.sources.push(label.to_string());
        }
        self.fallback |= retrieved.is_fallback();
    }

    /// Source label for the payload's `dataSource` field.
    pub(crate) fn data_source(&self) -> &'static str {
        if self.fallback {
            "fallback"
        } else if self.sources.is_empty() {
            "computed"
        } else {
            "live"
        }
    }

    pub(crate) fn finish(
        self,
        agent_type: AgentType,
        task_type: &str,
        data: Value,
        confidence: f64,
    ) -> AgentResult {
        let mut result = AgentResult::success(data, confidence).with_sources(self.sources, self.fallback);
        if let Some(metadata) = result.metadata.as_mut() {
            metadata.agent_type = Some(agent_type);
            metadata.task_type = Some(task_type.to_string());
        }
        result
    }
}

pub(crate) fn unsupported(agent: AgentType, task: &Task) -> AgentError {
    AgentError::UnsupportedTask {
        agent,
        task_type: task.task_type.clone(),
    }
}

/// Builds the implementation for a domain type.
///
/// The default factory is an exhaustive match, so adding an [`AgentType`]
/// variant without an implementation is a compile error.
pub trait AgentFactory: Send + Sync {
    fn build(&self, agent_type: AgentType) -> Box<dyn DomainAgent>;
}

/// Factory for the five production agents.
#[derive(Debug, Clone)]
pub struct DomainAgentFactory {
    http: reqwest::Client,
    shared: SharedKeys,
}

impl DomainAgentFactory {
    pub fn new(http: reqwest::Client, shared: SharedKeys) -> Self {
        Self { http, shared }
    }
}

impl AgentFactory for DomainAgentFactory {
    fn build(&self, agent_type: AgentType) -> Box<dyn DomainAgent> {
        let http = self.http.clone();
        let shared = self.shared.clone();
        match agent_type {
            AgentType::Travel => Box::new(TravelAgent::new(http, shared)),
            AgentType::Financial => Box::new(FinancialAgent::new(http, shared)),
            AgentType::Research => Box::new(ResearchAgent::new(http, shared)),
            AgentType::Learning => Box::new(LearningAgent::new(http, shared)),
            AgentType::Weather => Box::new(WeatherAgent::new(http, shared)),
        }
    }
}

/// Name and description of the agent seeded for each domain.
pub fn default_profile(agent_type: AgentType) -> (&'static str, &'static str) {
    match agent_type {
        AgentType::Travel => (
            "Travel Planner",
            "Searches flights and hotels, checks visa rules and drafts itineraries",
        ),
        AgentType::Financial => (
            "Financial Advisor",
            "Converts currencies, builds savings plans, analyzes budgets and suggests allocations",
        ),
        AgentType::Research => (
            "Research Analyst",
            "Gathers news, market research, competitor profiles and SWOT analyses",
        ),
        AgentType::Learning => (
            "Learning Coach",
            "Builds learning paths, finds courses and lays out study schedules",
        ),
        AgentType::Weather => (
            "Weather Forecaster",
            "Reports current conditions, forecasts and trip weather with packing advice",
        ),
    }
}
