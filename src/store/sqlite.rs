//! SQLite-based agent store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AgentRecord, AgentStore, CredentialRecord, GoalRecord, MonitorFrequency, MonitorRecord,
    StoreError, TaskExecutionRecord, ThresholdType,
};
use crate::agents::{AgentId, PerformanceMetrics};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    agent_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '1.0.0',
    capabilities TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 1,
    performance TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agents_type_active ON agents(agent_type, is_active);

CREATE TABLE IF NOT EXISTS agent_credentials (
    id TEXT PRIMARY KEY NOT NULL,
    agent_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    key_name TEXT NOT NULL,
    encrypted_value TEXT NOT NULL,
    expires_at TEXT,
    monthly_limit INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_credentials_agent ON agent_credentials(agent_id, is_active);

CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    assigned_agents TEXT NOT NULL DEFAULT '[]',
    last_agent_update TEXT
);

CREATE TABLE IF NOT EXISTS monitors (
    id TEXT PRIMARY KEY NOT NULL,
    goal_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    task_type TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    frequency TEXT NOT NULL,
    threshold REAL,
    threshold_type TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_monitors_goal ON monitors(goal_id);

CREATE TABLE IF NOT EXISTS task_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    goal_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    task_type TEXT NOT NULL,
    success INTEGER NOT NULL,
    execution_time_ms INTEGER NOT NULL,
    confidence REAL NOT NULL,
    error TEXT,
    executed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_agent ON task_executions(agent_id, id DESC);
"#;

pub struct SqliteAgentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAgentStore {
    /// Open (or create) the database file at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to create store dir: {}", e)))?;
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::debug!("Opened SQLite agent store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Bad timestamp {:?}: {}", s, e)))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("Bad id {:?}: {}", s, e)))
}

/// Raw column values, converted outside the rusqlite row closure so that
/// conversion errors surface as `StoreError`.
struct AgentRow {
    id: String,
    name: String,
    agent_type: String,
    description: String,
    version: String,
    capabilities: String,
    is_active: bool,
    performance: String,
    created_at: String,
}

const AGENT_COLUMNS: &str =
    "id, name, agent_type, description, version, capabilities, is_active, performance, created_at";

impl AgentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            agent_type: row.get(2)?,
            description: row.get(3)?,
            version: row.get(4)?,
            capabilities: row.get(5)?,
            is_active: row.get(6)?,
            performance: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<AgentRecord, StoreError> {
        Ok(AgentRecord {
            id: AgentId::from(parse_uuid(&self.id)?),
            name: self.name,
            agent_type: self.agent_type,
            description: self.description,
            version: self.version,
            capabilities: serde_json::from_str(&self.capabilities)?,
            is_active: self.is_active,
            performance: serde_json::from_str(&self.performance)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[async_trait]
impl AgentStore for SqliteAgentStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agents ORDER BY created_at ASC, rowid ASC",
                AGENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], AgentRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(AgentRow::into_record).collect()
        })
        .await
    }

    async fn list_active_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agents WHERE is_active = 1 ORDER BY created_at ASC, rowid ASC",
                AGENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], AgentRow::read)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(AgentRow::into_record).collect()
        })
        .await
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentRecord>, StoreError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
                    params![id.to_string()],
                    AgentRow::read,
                )
                .optional()?;
            row.map(AgentRow::into_record).transpose()
        })
        .await
    }

    async fn insert_agent(&self, agent: &AgentRecord) -> Result<(), StoreError> {
        let capabilities = serde_json::to_string(&agent.capabilities)?;
        let performance = serde_json::to_string(&agent.performance)?;
        let agent = agent.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agents (id, name, agent_type, description, version, capabilities,
                                     is_active, performance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    agent_type = excluded.agent_type,
                    description = excluded.description,
                    version = excluded.version,
                    capabilities = excluded.capabilities,
                    is_active = excluded.is_active,
                    performance = excluded.performance",
                params![
                    agent.id.to_string(),
                    agent.name,
                    agent.agent_type,
                    agent.description,
                    agent.version,
                    capabilities,
                    agent.is_active,
                    performance,
                    ts(&agent.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_performance(
        &self,
        id: AgentId,
        metrics: &PerformanceMetrics,
    ) -> Result<(), StoreError> {
        let performance = serde_json::to_string(metrics)?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE agents SET performance = ?1 WHERE id = ?2",
                params![performance, id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("agent", id));
            }
            Ok(())
        })
        .await
    }

    async fn set_agent_active(&self, id: AgentId, active: bool) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE agents SET is_active = ?1 WHERE id = ?2",
                params![active, id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("agent", id));
            }
            Ok(())
        })
        .await
    }

    async fn insert_credential(&self, credential: &CredentialRecord) -> Result<(), StoreError> {
        let c = credential.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agent_credentials (id, agent_id, provider, key_name, encrypted_value,
                                                expires_at, monthly_limit, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    c.id.to_string(),
                    c.agent_id.to_string(),
                    c.provider,
                    c.key_name,
                    c.encrypted_value,
                    c.expires_at.as_ref().map(ts),
                    c.monthly_limit,
                    c.is_active,
                    ts(&c.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_active_credentials(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<CredentialRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, provider, key_name, encrypted_value, expires_at, monthly_limit,
                        is_active, created_at
                 FROM agent_credentials
                 WHERE agent_id = ?1 AND is_active = 1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![agent_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<u32>>(5)?,
                        row.get::<_, bool>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(
                    |(id, provider, key_name, encrypted_value, expires_at, monthly_limit, is_active, created_at)| {
                        Ok(CredentialRecord {
                            id: parse_uuid(&id)?,
                            agent_id,
                            provider,
                            key_name,
                            encrypted_value,
                            expires_at: parse_opt_ts(expires_at)?,
                            monthly_limit,
                            is_active,
                            created_at: parse_ts(&created_at)?,
                        })
                    },
                )
                .collect()
        })
        .await
    }

    async fn get_goal(&self, id: &str) -> Result<Option<GoalRecord>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, assigned_agents, last_agent_update
                     FROM goals WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(id, user_id, title, assigned, last_update)| {
                Ok(GoalRecord {
                    id,
                    user_id,
                    title,
                    assigned_agents: serde_json::from_str(&assigned)?,
                    last_agent_update: parse_opt_ts(last_update)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn save_goal(&self, goal: &GoalRecord) -> Result<(), StoreError> {
        let assigned = serde_json::to_string(&goal.assigned_agents)?;
        let goal = goal.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO goals (id, user_id, title, assigned_agents, last_agent_update)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    title = excluded.title,
                    assigned_agents = excluded.assigned_agents,
                    last_agent_update = excluded.last_agent_update",
                params![
                    goal.id,
                    goal.user_id,
                    goal.title,
                    assigned,
                    goal.last_agent_update.as_ref().map(ts),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_monitor(&self, monitor: &MonitorRecord) -> Result<(), StoreError> {
        let parameters = serde_json::to_string(&monitor.parameters)?;
        let m = monitor.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO monitors (id, goal_id, user_id, agent_id, task_type, parameters,
                                       frequency, threshold, threshold_type, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    m.id.to_string(),
                    m.goal_id,
                    m.user_id,
                    m.agent_id.to_string(),
                    m.task_type,
                    parameters,
                    m.frequency.as_str(),
                    m.threshold,
                    m.threshold_type.map(|t| t.as_str()),
                    m.is_active,
                    ts(&m.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_monitors(&self, goal_id: &str) -> Result<Vec<MonitorRecord>, StoreError> {
        let goal_id = goal_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, goal_id, user_id, agent_id, task_type, parameters, frequency,
                        threshold, threshold_type, is_active, created_at
                 FROM monitors WHERE goal_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![goal_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<f64>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, bool>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|r| {
                    let frequency = MonitorFrequency::parse(&r.6).ok_or_else(|| {
                        StoreError::Serialization(format!("Unknown monitor frequency: {}", r.6))
                    })?;
                    Ok(MonitorRecord {
                        id: parse_uuid(&r.0)?,
                        goal_id: r.1,
                        user_id: r.2,
                        agent_id: AgentId::from(parse_uuid(&r.3)?),
                        task_type: r.4,
                        parameters: serde_json::from_str(&r.5)?,
                        frequency,
                        threshold: r.7,
                        threshold_type: r.8.as_deref().and_then(ThresholdType::parse),
                        is_active: r.9,
                        created_at: parse_ts(&r.10)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn record_execution(&self, record: &TaskExecutionRecord) -> Result<(), StoreError> {
        let r = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO task_executions (execution_id, agent_id, goal_id, user_id, task_type,
                                              success, execution_time_ms, confidence, error, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    r.id.to_string(),
                    r.agent_id.to_string(),
                    r.goal_id,
                    r.user_id,
                    r.task_type,
                    r.success,
                    r.execution_time_ms as i64,
                    r.confidence,
                    r.error,
                    ts(&r.executed_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_executions(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id, goal_id, user_id, task_type, success, execution_time_ms,
                        confidence, error, executed_at
                 FROM task_executions WHERE agent_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![agent_id.to_string(), limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|r| {
                    Ok(TaskExecutionRecord {
                        id: parse_uuid(&r.0)?,
                        agent_id,
                        goal_id: r.1,
                        user_id: r.2,
                        task_type: r.3,
                        success: r.4,
                        execution_time_ms: r.5.max(0) as u64,
                        confidence: r.6,
                        error: r.7,
                        executed_at: parse_ts(&r.8)?,
                    })
                })
                .collect()
        })
        .await
    }
}
