//! Agent manager - the orchestrator between tasks and domain agents.
//!
//! # Registry
//! Loaded agents live in an arena owned by the manager. Each slot pairs the
//! agent's metadata (including performance metrics) with its implementation:
//!
//! ```text
//!   Registry ── slots: [ AgentSlot { meta: Agent, handle: Arc<RwLock<Box<dyn DomainAgent>>> }, … ]
//!            └─ index: AgentId → slot position
//! ```
//!
//! Slots are never removed; deactivation clears the metadata's active flag so
//! positions stay stable. Metrics are read-modify-written while holding the
//! registry write lock.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::{
    default_profile, Agent, AgentError, AgentFactory, AgentId, AgentResult, AgentType, Capability,
    Credential, DomainAgent, PerformanceMetrics, ResultMetadata,
};
use crate::store::{
    AgentRecord, AgentStore, AssignedAgent, CredentialRecord, MonitorFrequency, MonitorRecord,
    StoreError, TaskExecutionRecord, ThresholdType,
};
use crate::task::{agent_type_for_task, Task};
use crate::vault::{CredentialVault, VaultError};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Request to store a provider credential for one agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub provider: String,
    #[serde(default = "default_key_name")]
    pub key_name: String,
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub monthly_limit: Option<u32>,
}

fn default_key_name() -> String {
    "api_key".to_string()
}

impl CredentialRequest {
    pub fn new(provider: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            key_name: default_key_name(),
            value: value.into(),
            expires_at: None,
            monthly_limit: None,
        }
    }
}

/// Request to record a monitoring rule for a goal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRequest {
    pub goal_id: String,
    pub user_id: String,
    pub task_type: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub frequency: MonitorFrequency,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub threshold_type: Option<ThresholdType>,
}

/// Snapshot of one agent's performance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub agent_id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub is_active: bool,
    pub metrics: PerformanceMetrics,
}

type AgentHandle = Arc<RwLock<Box<dyn DomainAgent>>>;

struct AgentSlot {
    meta: Agent,
    handle: AgentHandle,
}

#[derive(Default)]
struct Registry {
    slots: Vec<AgentSlot>,
    index: HashMap<AgentId, usize>,
}

impl Registry {
    fn insert(&mut self, slot: AgentSlot) {
        let id = slot.meta.id;
        match self.index.get(&id) {
            Some(&pos) => self.slots[pos] = slot,
            None => {
                self.index.insert(id, self.slots.len());
                self.slots.push(slot);
            }
        }
    }

    fn get(&self, id: AgentId) -> Option<&AgentSlot> {
        self.index.get(&id).map(|&pos| &self.slots[pos])
    }

    fn get_mut(&mut self, id: AgentId) -> Option<&mut AgentSlot> {
        match self.index.get(&id) {
            Some(&pos) => self.slots.get_mut(pos),
            None => None,
        }
    }

    /// First active agent of `agent_type`, in load order.
    fn first_active(&self, agent_type: AgentType) -> Option<&AgentSlot> {
        self.slots
            .iter()
            .find(|s| s.meta.is_active && s.meta.agent_type == agent_type)
    }
}

/// Routes tasks to domain agents and keeps their bookkeeping.
pub struct AgentManager {
    store: Arc<dyn AgentStore>,
    vault: Arc<CredentialVault>,
    factory: Arc<dyn AgentFactory>,
    registry: RwLock<Registry>,
}

impl AgentManager {
    /// Build a manager and load every active agent from the store.
    pub async fn new(
        store: Arc<dyn AgentStore>,
        vault: Arc<CredentialVault>,
        factory: Arc<dyn AgentFactory>,
    ) -> Result<Self, ManagerError> {
        let manager = Self {
            store,
            vault,
            factory,
            registry: RwLock::new(Registry::default()),
        };
        manager.load().await?;
        Ok(manager)
    }

    async fn load(&self) -> Result<(), ManagerError> {
        let records = self.store.list_active_agents().await?;
        let mut loaded = 0usize;

        for record in records {
            let Some(meta) = record.to_agent() else {
                tracing::warn!(
                    agent_id = %record.id,
                    agent_type = %record.agent_type,
                    "Skipping agent with unknown type"
                );
                continue;
            };

            let mut implementation = self.factory.build(meta.agent_type);
            self.inject_credentials(meta.id, implementation.as_mut())
                .await?;

            self.registry.write().await.insert(AgentSlot {
                meta,
                handle: Arc::new(RwLock::new(implementation)),
            });
            loaded += 1;
        }

        tracing::info!(agents = loaded, "Agent registry loaded");
        Ok(())
    }

    /// Decrypt and install each usable stored credential. A credential that
    /// fails to decrypt is skipped on its own.
    async fn inject_credentials(
        &self,
        agent_id: AgentId,
        agent: &mut dyn DomainAgent,
    ) -> Result<(), ManagerError> {
        let now = Utc::now();
        for record in self.store.list_active_credentials(agent_id).await? {
            if record.expires_at.map(|at| at <= now).unwrap_or(false) {
                tracing::debug!(agent_id = %agent_id, provider = %record.provider, "Skipping expired credential");
                continue;
            }

            let value = match self.vault.decrypt(&record.encrypted_value) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        agent_id = %agent_id,
                        provider = %record.provider,
                        error = %e,
                        "Skipping credential that failed to decrypt"
                    );
                    continue;
                }
            };

            agent.set_api_credentials(&record.provider, credential_from(&record, value));
        }
        Ok(())
    }

    /// Persist a new agent and load it into the registry. With no explicit
    /// capabilities the implementation's own list is stored.
    pub async fn register_agent(
        &self,
        name: &str,
        agent_type: AgentType,
        description: &str,
        capabilities: Vec<Capability>,
    ) -> Result<Agent, ManagerError> {
        let implementation = self.factory.build(agent_type);
        let capabilities = if capabilities.is_empty() {
            implementation.capabilities()
        } else {
            capabilities
        };

        let agent = Agent::new(name, agent_type, description, capabilities);
        self.store.insert_agent(&AgentRecord::from(&agent)).await?;

        self.registry.write().await.insert(AgentSlot {
            meta: agent.clone(),
            handle: Arc::new(RwLock::new(implementation)),
        });

        tracing::info!(agent_id = %agent.id, agent_type = %agent_type, name = %name, "Registered agent");
        Ok(agent)
    }

    /// Register one default agent for every domain that has no active agent.
    pub async fn seed_default_agents(&self) -> Result<Vec<Agent>, ManagerError> {
        let missing: Vec<AgentType> = {
            let registry = self.registry.read().await;
            AgentType::ALL
                .into_iter()
                .filter(|t| registry.first_active(*t).is_none())
                .collect()
        };

        let mut seeded = Vec::with_capacity(missing.len());
        for agent_type in missing {
            let (name, description) = default_profile(agent_type);
            seeded.push(
                self.register_agent(name, agent_type, description, Vec::new())
                    .await?,
            );
        }
        if !seeded.is_empty() {
            tracing::info!(count = seeded.len(), "Seeded default agents");
        }
        Ok(seeded)
    }

    /// Assign the first active agent of each requested type to a goal.
    /// Types with no active agent are left out.
    pub async fn assign_agents_to_goal(
        &self,
        goal_id: &str,
        agent_types: &[AgentType],
    ) -> Result<Vec<AssignedAgent>, ManagerError> {
        let mut goal = self
            .store
            .get_goal(goal_id)
            .await?
            .ok_or_else(|| ManagerError::GoalNotFound(goal_id.to_string()))?;

        let now = Utc::now();
        let assigned: Vec<AssignedAgent> = {
            let registry = self.registry.read().await;
            agent_types
                .iter()
                .filter_map(|t| match registry.first_active(*t) {
                    Some(slot) => Some(AssignedAgent {
                        agent_id: slot.meta.id,
                        agent_type: *t,
                        assigned_at: now,
                    }),
                    None => {
                        tracing::warn!(goal_id = %goal_id, agent_type = %t, "No active agent to assign");
                        None
                    }
                })
                .collect()
        };

        goal.assigned_agents = assigned.clone();
        goal.last_agent_update = Some(now);
        self.store.save_goal(&goal).await?;

        tracing::info!(goal_id = %goal_id, assigned = assigned.len(), "Assigned agents to goal");
        Ok(assigned)
    }

    /// Run a task on the agent its type maps to.
    ///
    /// Never fails: agent errors, panics and missing agents all come back as
    /// an unsuccessful [`AgentResult`].
    pub async fn execute_task(&self, task: &Task) -> AgentResult {
        let started = Instant::now();
        let agent_type = task.agent_type();

        let target = {
            let registry = self.registry.read().await;
            registry
                .first_active(agent_type)
                .map(|slot| (slot.meta.id, Arc::clone(&slot.handle)))
        };

        let Some((agent_id, handle)) = target else {
            let err = AgentError::NoSuitableAgent(task.task_type.clone());
            tracing::warn!(task_type = %task.task_type, agent_type = %agent_type, "{}", err);
            return annotate(AgentResult::failure(err.to_string()), agent_type, task, 0);
        };

        tracing::debug!(
            agent_id = %agent_id,
            agent_type = %agent_type,
            task_type = %task.task_type,
            goal_id = %task.goal_id,
            "Executing task"
        );

        let outcome = {
            let agent = handle.read().await;
            let outcome = AssertUnwindSafe(agent.execute_task(task))
                .catch_unwind()
                .await;
            outcome
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(agent_id = %agent_id, task_type = %task.task_type, error = %e, "Task failed");
                AgentResult::failure(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(agent_id = %agent_id, task_type = %task.task_type, panic = %message, "Agent panicked");
                AgentResult::failure(format!("Agent panicked: {}", message))
            }
        };
        let result = annotate(result, agent_type, task, elapsed_ms);

        self.record_outcome(agent_id, task, &result, elapsed_ms)
            .await;
        result
    }

    /// Fold the outcome into the agent's metrics and persist the bookkeeping.
    /// Storage failures are logged; the caller still gets its result.
    async fn record_outcome(&self, agent_id: AgentId, task: &Task, result: &AgentResult, elapsed_ms: u64) {
        let now = Utc::now();
        {
            // The write lock stays held until the snapshot is stored, so
            // persisted metrics land in the same order they were recorded.
            let mut registry = self.registry.write().await;
            if let Some(slot) = registry.get_mut(agent_id) {
                slot.meta
                    .performance
                    .record(elapsed_ms as f64, result.success, now);
                if let Err(e) = self
                    .store
                    .update_performance(agent_id, &slot.meta.performance)
                    .await
                {
                    tracing::warn!(agent_id = %agent_id, error = %e, "Failed to persist performance metrics");
                }
            }
        }

        let record = TaskExecutionRecord {
            id: Uuid::new_v4(),
            agent_id,
            goal_id: task.goal_id.clone(),
            user_id: task.user_id.clone(),
            task_type: task.task_type.clone(),
            success: result.success,
            execution_time_ms: elapsed_ms,
            confidence: result.confidence,
            error: result.error.clone(),
            executed_at: now,
        };
        if let Err(e) = self.store.record_execution(&record).await {
            tracing::warn!(agent_id = %agent_id, error = %e, "Failed to record task execution");
        }
    }

    /// Whether the agent serving this task would accept its parameters.
    pub async fn validate_task(&self, task: &Task) -> bool {
        let handle = {
            let registry = self.registry.read().await;
            registry
                .first_active(task.agent_type())
                .map(|slot| Arc::clone(&slot.handle))
        };
        match handle {
            Some(handle) => handle
                .read()
                .await
                .validate_parameters(&task.task_type, &task.parameters),
            None => false,
        }
    }

    /// Persist a monitoring rule. Nothing schedules it.
    pub async fn setup_monitoring(
        &self,
        request: MonitorRequest,
    ) -> Result<MonitorRecord, ManagerError> {
        let agent_type = agent_type_for_task(&request.task_type);
        let agent_id = {
            let registry = self.registry.read().await;
            registry
                .first_active(agent_type)
                .map(|slot| slot.meta.id)
                .ok_or_else(|| AgentError::NoSuitableAgent(request.task_type.clone()))?
        };

        let monitor = MonitorRecord {
            id: Uuid::new_v4(),
            goal_id: request.goal_id,
            user_id: request.user_id,
            agent_id,
            task_type: request.task_type,
            parameters: request.parameters,
            frequency: request.frequency,
            threshold: request.threshold,
            threshold_type: request.threshold_type,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_monitor(&monitor).await?;

        tracing::info!(
            monitor_id = %monitor.id,
            goal_id = %monitor.goal_id,
            task_type = %monitor.task_type,
            frequency = monitor.frequency.as_str(),
            "Monitoring rule stored"
        );
        Ok(monitor)
    }

    /// Encrypt and persist a credential, then install it on the loaded agent.
    pub async fn add_api_credentials(
        &self,
        agent_id: AgentId,
        request: CredentialRequest,
    ) -> Result<(), ManagerError> {
        let handle = {
            let registry = self.registry.read().await;
            registry.get(agent_id).map(|slot| Arc::clone(&slot.handle))
        };
        if handle.is_none() && self.store.get_agent(agent_id).await?.is_none() {
            return Err(ManagerError::AgentNotFound(agent_id));
        }

        let record = CredentialRecord {
            id: Uuid::new_v4(),
            agent_id,
            provider: request.provider.clone(),
            key_name: request.key_name.clone(),
            encrypted_value: self.vault.encrypt(&request.value)?,
            expires_at: request.expires_at,
            monthly_limit: request.monthly_limit,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_credential(&record).await?;

        if let Some(handle) = handle {
            let credential = credential_from(&record, request.value);
            handle
                .write()
                .await
                .set_api_credentials(&record.provider, credential);
        }

        tracing::info!(agent_id = %agent_id, provider = %record.provider, "Stored API credential");
        Ok(())
    }

    /// Whether the loaded agent holds a credential for `provider`.
    pub async fn has_credential(&self, agent_id: AgentId, provider: &str) -> bool {
        let handle = {
            let registry = self.registry.read().await;
            registry.get(agent_id).map(|slot| Arc::clone(&slot.handle))
        };
        match handle {
            Some(handle) => handle.read().await.api_credentials(provider).is_some(),
            None => false,
        }
    }

    /// Metadata of every loaded agent, active or not.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry
            .read()
            .await
            .slots
            .iter()
            .map(|slot| slot.meta.clone())
            .collect()
    }

    pub async fn agent_performance(&self, agent_id: AgentId) -> Option<AgentPerformance> {
        let registry = self.registry.read().await;
        registry.get(agent_id).map(|slot| AgentPerformance {
            agent_id,
            name: slot.meta.name.clone(),
            agent_type: slot.meta.agent_type,
            is_active: slot.meta.is_active,
            metrics: slot.meta.performance.clone(),
        })
    }

    /// Most recent executions handled by one agent.
    pub async fn recent_executions(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionRecord>, ManagerError> {
        Ok(self.store.list_executions(agent_id, limit).await?)
    }

    /// Stop routing tasks to an agent. The record is kept.
    pub async fn deactivate_agent(&self, agent_id: AgentId) -> Result<(), ManagerError> {
        self.store
            .set_agent_active(agent_id, false)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ManagerError::AgentNotFound(agent_id),
                other => ManagerError::Store(other),
            })?;

        if let Some(slot) = self.registry.write().await.get_mut(agent_id) {
            slot.meta.is_active = false;
        }
        tracing::info!(agent_id = %agent_id, "Deactivated agent");
        Ok(())
    }
}

fn credential_from(record: &CredentialRecord, value: String) -> Credential {
    let mut credential = Credential::new(&record.provider, &record.key_name, value);
    credential.expires_at = record.expires_at;
    credential.monthly_limit = record.monthly_limit;
    credential.is_active = record.is_active;
    credential
}

/// Stamp timing and routing onto a result's metadata.
fn annotate(mut result: AgentResult, agent_type: AgentType, task: &Task, elapsed_ms: u64) -> AgentResult {
    let metadata = result.metadata.get_or_insert_with(ResultMetadata::default);
    metadata.execution_time_ms = Some(elapsed_ms);
    metadata.agent_type = Some(agent_type);
    metadata.task_type = Some(task.task_type.clone());
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
