//! Decrypted provider credentials held by a loaded agent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A decrypted provider credential.
///
/// The plaintext only ever lives in process memory; the persisted form is a
/// [`crate::store::CredentialRecord`] holding vault ciphertext.
#[derive(Clone)]
pub struct Credential {
    pub provider: String,
    pub key_name: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Stored for reporting; not enforced.
    pub monthly_limit: Option<u32>,
    pub is_active: bool,
}

impl Credential {
    pub fn new(provider: impl Into<String>, key_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            key_name: key_name.into(),
            value: value.into(),
            expires_at: None,
            monthly_limit: None,
            is_active: true,
        }
    }

    /// Active and not past its expiry.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("key_name", &self.key_name)
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("monthly_limit", &self.monthly_limit)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Process-wide keys shared by several providers of one aggregator
/// (e.g. a single RapidAPI key). Loaded from configuration, never from
/// inside an agent.
#[derive(Clone, Default)]
pub struct SharedKeys(Arc<HashMap<String, String>>);

impl SharedKeys {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self(Arc::new(keys))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for SharedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.0.keys().collect();
        names.sort();
        f.debug_tuple("SharedKeys").field(&names).finish()
    }
}

/// Credentials owned by one agent, keyed by provider name.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    by_provider: HashMap<String, Credential>,
    shared: SharedKeys,
}

impl CredentialSet {
    pub fn new(shared: SharedKeys) -> Self {
        Self {
            by_provider: HashMap::new(),
            shared,
        }
    }

    /// Insert or replace the credential for `provider`.
    pub fn insert(&mut self, provider: impl Into<String>, credential: Credential) {
        self.by_provider.insert(provider.into(), credential);
    }

    pub fn get(&self, provider: &str) -> Option<&Credential> {
        self.by_provider.get(provider)
    }

    /// Resolve the secret for a provider: the agent's own usable credential
    /// first, then the shared aggregator key if the provider names one.
    pub fn key_for(&self, provider: &str, shared_alias: Option<&str>) -> Option<&str> {
        let now = Utc::now();
        self.by_provider
            .get(provider)
            .filter(|c| c.is_usable(now) && !c.value.trim().is_empty())
            .map(|c| c.value.as_str())
            .or_else(|| shared_alias.and_then(|alias| self.shared.get(alias)))
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_provider.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_provider.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_provider.is_empty()
    }
}
