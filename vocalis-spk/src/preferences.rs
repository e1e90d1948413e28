//! Read-only user preference lookup

use crate::config::SelectionMode;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use vocalis_core::UserId;

/// Per-user provider preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserPreference {
    pub preferred_provider: Option<String>,
    pub voice: Option<String>,
    /// Custom fallback chain tried after the preferred provider
    pub fallback_chain: Vec<String>,
    /// Overrides the configured selection mode
    pub mode: Option<SelectionMode>,
}

/// Preference store owned by the session layer
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<UserPreference>;
}

/// In-memory preference store
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    entries: DashMap<UserId, UserPreference>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: impl Into<UserId>, preference: UserPreference) {
        self.entries.insert(user_id.into(), preference);
    }

    pub fn remove(&self, user_id: &str) {
        self.entries.remove(user_id);
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> Option<UserPreference> {
        self.entries.get(user_id).map(|p| p.clone())
    }
}
