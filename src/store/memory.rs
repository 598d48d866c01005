//! In-memory agent store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AgentRecord, AgentStore, CredentialRecord, GoalRecord, MonitorRecord, StoreError,
    TaskExecutionRecord,
};
use crate::agents::{AgentId, PerformanceMetrics};

#[derive(Default)]
struct Tables {
    /// Insertion order is kept so listing is stable.
    agents: Vec<AgentRecord>,
    credentials: Vec<CredentialRecord>,
    goals: HashMap<String, GoalRecord>,
    monitors: Vec<MonitorRecord>,
    executions: Vec<TaskExecutionRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryAgentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        Ok(self.tables.read().await.agents.clone())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn insert_agent(&self, agent: &AgentRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent.clone(),
            None => tables.agents.push(agent.clone()),
        }
        Ok(())
    }

    async fn update_performance(
        &self,
        id: AgentId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("agent", id))?;
        agent.performance = metrics.clone();
        Ok(())
    }

    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("agent", id))?;
        agent.is_active = active;
        Ok(())
    }

    async fn insert_credential(&self, credential: &CredentialRecord) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .credentials
            .push(credential.clone());
        Ok(())
    }

    async fn list_active_credentials(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<CredentialRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .credentials
            .iter()
            .filter(|c| c.agent_id == agent_id && c.is_active)
            .cloned()
            .collect())
    }

    async fn get_goal(&self, id: &str) -> Result<Option<GoalRecord>, StoreError> {
        Ok(self.tables.read().await.goals.get(id).cloned())
    }

    async fn save_goal(&self, goal: &GoalRecord) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .goals
            .insert(goal.id.clone(), goal.clone());
        Ok(())
    }

    async fn insert_monitor(&self, monitor: &MonitorRecord) -> Result<(), StoreError> {
        self.tables.write().await.monitors.push(monitor.clone());
        Ok(())
    }

    async fn list_monitors(&self, goal_id: &str) -> Result<Vec<MonitorRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .monitors
            .iter()
            .filter(|m| m.goal_id == goal_id)
            .cloned()
            .collect())
    }

    async fn record_execution(&self, record: &TaskExecutionRecord) -> Result<(), StoreError> {
        self.tables.write().await.executions.push(record.clone());
        Ok(())
    }

    async fn list_executions(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .executions
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Agent, AgentType};

    #[tokio::test]
    async fn test_performance_update_requires_agent() {
        let store = InMemoryAgentStore::new();
        let err = store
            .update_performance(AgentId::new(), &PerformanceMetrics::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "agent", .. }));

        let agent = Agent::new("Weather", AgentType::Weather, "forecasts", Vec::new());
        store.insert_agent(&AgentRecord::from(&agent)).await.unwrap();
        store.set_agent_active(agent.id, false).await.unwrap();
        assert!(store.list_active_agents().await.unwrap().is_empty());
        assert_eq!(store.list_agents().await.unwrap().len(), 1);
    }
}
