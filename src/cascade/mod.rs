//! Resilient retrieval cascade.
//!
//! An ordered ladder of external providers that is walked top to bottom for a
//! single query:
//!
//! ```text
//!   primary ──fail──▶ secondary ──fail──▶ … ──fail──▶ synthetic
//!      │                  │                              │
//!      └──── ok ──────────┴──────────── ok ──────────────┘──▶ Retrieved<T>
//! ```
//!
//! - A tier whose credential is missing is skipped, not attempted.
//! - Each attempted tier is called exactly once; failures are logged and never
//!   surfaced to the caller.
//! - The first success short-circuits the rest of the ladder.
//! - The synthetic generator always succeeds, so `run` is infallible.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::agents::CredentialSet;

/// Error from a single provider call. Always tier-local.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// One external data source in a cascade.
#[async_trait]
pub trait Provider<Q, T>: Send + Sync
where
    Q: Sync,
{
    /// Provider name; also the key into the agent's credential set.
    fn name(&self) -> &str;

    /// Shared aggregator key this provider may fall back to.
    fn shared_credential(&self) -> Option<&str> {
        None
    }

    async fn fetch(&self, query: &Q, api_key: &str) -> Result<T, ProviderError>;
}

/// Where a retrieved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "provider", rename_all = "lowercase")]
pub enum DataSource {
    Live(String),
    Synthetic,
}

impl DataSource {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic)
    }

    /// Provider name, or `"synthetic"`.
    pub fn label(&self) -> &str {
        match self {
            DataSource::Live(name) => name,
            DataSource::Synthetic => "synthetic",
        }
    }
}

/// Output of a cascade run.
#[derive(Debug, Clone)]
pub struct Retrieved<T> {
    pub value: T,
    pub source: DataSource,
    /// Providers that were actually called, in order.
    pub attempted: Vec<String>,
}

impl<T> Retrieved<T> {
    pub fn is_fallback(&self) -> bool {
        self.source.is_synthetic()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Retrieved<U> {
        Retrieved {
            value: f(self.value),
            source: self.source,
            attempted: self.attempted,
        }
    }
}

/// Ordered provider ladder for one kind of query.
pub struct Cascade<Q, T> {
    label: &'static str,
    tiers: Vec<Arc<dyn Provider<Q, T>>>,
}

impl<Q, T> Clone for Cascade<Q, T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            tiers: self.tiers.clone(),
        }
    }
}

impl<Q: Sync, T> std::fmt::Debug for Cascade<Q, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tiers.iter().map(|t| t.name()).collect();
        f.debug_struct("Cascade")
            .field("label", &self.label)
            .field("tiers", &names)
            .finish()
    }
}

impl<Q, T> Cascade<Q, T>
where
    Q: Sync,
    T: Send,
{
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            tiers: Vec::new(),
        }
    }

    /// Append a tier below the existing ones.
    pub fn tier(mut self, provider: Arc<dyn Provider<Q, T>>) -> Self {
        self.tiers.push(provider);
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Walk the live tiers only. `None` when every tier was skipped or failed.
    pub async fn try_live(
        &self,
        query: &Q,
        credentials: &CredentialSet,
    ) -> (Option<(T, String)>, Vec<String>) {
        let mut attempted = Vec::new();

        for tier in &self.tiers {
            let name = tier.name();
            let Some(api_key) = credentials.key_for(name, tier.shared_credential()) else {
                tracing::debug!(cascade = self.label, provider = name, "Skipping tier without credential");
                continue;
            };

            attempted.push(name.to_string());
            match tier.fetch(query, api_key).await {
                Ok(value) => {
                    tracing::debug!(cascade = self.label, provider = name, "Tier succeeded");
                    return (Some((value, name.to_string())), attempted);
                }
                Err(e) => {
                    tracing::warn!(
                        cascade = self.label,
                        provider = name,
                        "Provider failed, falling through: {}",
                        e
                    );
                }
            }
        }

        (None, attempted)
    }

    /// Walk the ladder and fall back to `synthetic` on exhaustion.
    pub async fn run<F>(&self, query: &Q, credentials: &CredentialSet, synthetic: F) -> Retrieved<T>
    where
        F: FnOnce(&Q) -> T + Send,
    {
        let (live, attempted) = self.try_live(query, credentials).await;
        match live {
            Some((value, provider)) => Retrieved {
                value,
                source: DataSource::Live(provider),
                attempted,
            },
            None => {
                tracing::info!(
                    cascade = self.label,
                    attempted = attempted.len(),
                    "All providers exhausted, using synthetic data"
                );
                Retrieved {
                    value: synthetic(query),
                    source: DataSource::Synthetic,
                    attempted,
                }
            }
        }
    }
}

/// Deterministic generator for synthetic data.
///
/// Seeded from a digest of the query text so the same request yields the
/// same mock payload across calls.
pub fn seeded_rng(seed: &str) -> StdRng {
    StdRng::from_seed(Sha256::digest(seed.as_bytes()).into())
}

/// Round to two decimals (money).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
