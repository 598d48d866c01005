//! goal-agents - command line entry point
//!
//! Loads the agent registry, seeds one agent per domain if needed, runs a
//! single task and prints the result as JSON.
//!
//! ```text
//! goal-agents '{"goalId":"g1","userId":"u1","type":"convertCurrency",
//!               "parameters":{"amount":100,"fromCurrency":"USD","toCurrency":"EUR"}}'
//! echo '{...}' | goal-agents
//! goal-agents chat "I want to visit Japan next spring"
//! ```

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use goal_agents::agents::DomainAgentFactory;
use goal_agents::generation::{ChatService, GeminiClient, GenerationRing};
use goal_agents::providers::http_client;
use goal_agents::store::SqliteAgentStore;
use goal_agents::task::Task;
use goal_agents::vault::CredentialVault;
use goal_agents::{AgentManager, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goal_agents=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        database = %config.database_path.display(),
        models = ?config.generation_models,
        "Loaded configuration"
    );

    let http = http_client(config.http_timeout);
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("chat") {
        let api_key = config
            .gemini_api_key
            .clone()
            .context("GEMINI_API_KEY is required for chat")?;
        let ring = GenerationRing::new(
            config.generation_models.clone(),
            config.generation_retry_delay,
        );
        let chat = ChatService::new(Arc::new(GeminiClient::new(http, api_key)), ring);
        let goal = args[1..].join(" ");
        let clarification = chat.clarify_goal(&goal, &[]).await;
        println!("{}", serde_json::to_string_pretty(&clarification)?);
        return Ok(());
    }

    let store = Arc::new(SqliteAgentStore::new(config.database_path.clone()).await?);
    let vault = Arc::new(CredentialVault::new(config.encryption_secret.clone()));
    let factory = Arc::new(DomainAgentFactory::new(http, config.shared_keys()));
    let manager = AgentManager::new(store, vault, factory).await?;
    manager.seed_default_agents().await?;

    let raw = match args.first() {
        Some(arg) => arg.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read task from stdin")?;
            buf
        }
    };
    let task: Task = serde_json::from_str(&raw).context("Task is not valid JSON")?;

    let result = manager.execute_task(&task).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
