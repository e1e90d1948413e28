//! Short-lived availability memo keyed by (provider, language)

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Entry {
    healthy: bool,
    checked_at: Instant,
}

/// Cached health results with a TTL, invalidated eagerly on failure
#[derive(Debug)]
pub struct AvailabilityCache {
    ttl: Duration,
    entries: DashMap<(String, String), Entry>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached result, if any
    pub fn get(&self, provider_id: &str, language: &str) -> Option<bool> {
        let key = (provider_id.to_string(), language.to_string());
        let entry = *self.entries.get(&key)?;
        if entry.checked_at.elapsed() < self.ttl {
            Some(entry.healthy)
        } else {
            self.entries.remove(&key);
            None
        }
    }

    pub fn set(&self, provider_id: &str, language: &str, healthy: bool) {
        self.entries.insert(
            (provider_id.to_string(), language.to_string()),
            Entry {
                healthy,
                checked_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, provider_id: &str, language: &str) {
        self.entries
            .remove(&(provider_id.to_string(), language.to_string()));
    }

    /// Drop every language entry for a provider
    pub fn invalidate_provider(&self, provider_id: &str) {
        self.entries.retain(|(provider, _), _| provider != provider_id);
        debug!(provider = %provider_id, "Availability entries invalidated");
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
