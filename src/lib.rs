//! # goal-agents
//!
//! Agent orchestration and resilient data retrieval for a goal-planning
//! backend.
//!
//! This library provides:
//! - Five domain agents (travel, financial, research, learning, weather) behind
//!   one capability contract
//! - A retrieval cascade that walks external providers in order and falls back
//!   to deterministic synthetic data, so every handler answers
//! - An encrypted credential vault for per-agent provider keys
//! - A multi-model generation ring for the chat and feasibility service
//! - An agent manager that routes tasks, tracks performance and persists
//!   bookkeeping
//!
//! ## Architecture
//!
//! ```text
//!   Task ──▶ AgentManager ──▶ registry slot ──▶ DomainAgent
//!                 │                                  │
//!                 │                                  ▼
//!                 │                    Cascade: provider … ▶ synthetic
//!                 ▼
//!           AgentStore (metrics, executions, credentials, goals)
//!
//!   ChatService ──▶ GenerationRing ──▶ TextGenerator (Gemini)
//! ```
//!
//! ## Modules
//! - `agents`: capability contract, domain agents, credential sets
//! - `cascade`: ordered provider fallback with synthetic floor
//! - `providers`: HTTP clients for the external data sources
//! - `generation`: model ring, Gemini client, chat service
//! - `manager`: task routing and agent lifecycle
//! - `store`: persistence trait with memory and SQLite backends
//! - `task`: tasks, task kinds and typed parameters
//! - `vault`: AES-GCM credential encryption

pub mod agents;
pub mod cascade;
pub mod config;
pub mod generation;
pub mod manager;
pub mod providers;
pub mod store;
pub mod task;
pub mod vault;

pub use config::Config;
pub use manager::AgentManager;
