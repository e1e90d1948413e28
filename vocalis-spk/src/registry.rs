//! Provider registry: lazily constructed, shared provider instances

use crate::catalog::{ProviderCatalog, ProviderDescriptor, ProviderKind};
use crate::config::SpeechConfig;
use crate::credentials::CredentialStore;
use crate::engines::{ApiTtsEngine, EspeakTtsEngine, TtsEngine};
use crate::error::SpeechError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// A constructed client bound to a descriptor
pub struct ProviderInstance {
    pub descriptor: ProviderDescriptor,
    pub engine: Arc<dyn TtsEngine>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("provider", &self.descriptor.id)
            .field("engine", &self.engine.name())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Rolling per-provider call statistics
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProviderStats {
    pub provider: String,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    /// Mean latency of successful calls in milliseconds
    pub mean_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProviderStats {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        let total = self.successes + self.failures;
        (total > 0).then(|| self.successes as f64 / total as f64)
    }
}

/// Registry of provider instances, created once at startup and shared via `Arc`
pub struct ProviderRegistry {
    catalog: ProviderCatalog,
    config: Arc<SpeechConfig>,
    credentials: Arc<dyn CredentialStore>,
    instances: DashMap<String, Arc<ProviderInstance>>,
    injected: DashMap<String, Arc<dyn TtsEngine>>,
    stats: RwLock<HashMap<String, ProviderStats>>,
    rate_windows: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl ProviderRegistry {
    pub fn new(
        catalog: ProviderCatalog,
        config: SpeechConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Config)?;
        catalog.validate().map_err(SpeechError::Config)?;

        info!("Provider registry created with {} providers", catalog.len());

        Ok(Self {
            catalog,
            config: Arc::new(config),
            credentials,
            instances: DashMap::new(),
            injected: DashMap::new(),
            stats: RwLock::new(HashMap::new()),
            rate_windows: DashMap::new(),
        })
    }

    /// Inject an engine for a catalog entry, bypassing constructor lookup
    pub fn register_engine(&self, provider_id: &str, engine: Arc<dyn TtsEngine>) -> Result<(), SpeechError> {
        if self.catalog.get(provider_id).is_none() {
            return Err(SpeechError::Config(format!(
                "Cannot register engine for unknown provider '{}'",
                provider_id
            )));
        }
        self.injected.insert(provider_id.to_string(), engine);
        self.instances.remove(provider_id);
        debug!(provider = %provider_id, "Engine injected");
        Ok(())
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub fn descriptor(&self, provider_id: &str) -> Option<&ProviderDescriptor> {
        self.catalog.get(provider_id)
    }

    /// Whether a provider could be constructed with the current credentials
    pub fn has_credentials(&self, descriptor: &ProviderDescriptor) -> bool {
        !descriptor.credential_required
            || self.injected.contains_key(&descriptor.id)
            || self.credentials.get(&descriptor.id).is_some()
    }

    /// Get or lazily construct the instance for a provider
    pub fn instance(&self, provider_id: &str) -> Result<Arc<ProviderInstance>, SpeechError> {
        if let Some(instance) = self.instances.get(provider_id) {
            return Ok(instance.clone());
        }

        let descriptor = self.catalog.get(provider_id).ok_or_else(|| SpeechError::ProviderUnavailable {
            provider: provider_id.to_string(),
            reason: "unknown provider".to_string(),
        })?;

        if self.config.is_disabled(provider_id) {
            return Err(SpeechError::ProviderUnavailable {
                provider: provider_id.to_string(),
                reason: "disabled by configuration".to_string(),
            });
        }

        let engine = self.construct(descriptor)?;
        let instance = Arc::new(ProviderInstance {
            descriptor: descriptor.clone(),
            engine,
            created_at: Utc::now(),
        });

        // A concurrent caller may have won the race; keep whichever landed first
        let instance = self
            .instances
            .entry(provider_id.to_string())
            .or_insert(instance)
            .clone();

        debug!(provider = %provider_id, engine = %instance.engine.name(), "Provider instance ready");
        Ok(instance)
    }

    fn construct(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn TtsEngine>, SpeechError> {
        if let Some(engine) = self.injected.get(&descriptor.id) {
            return Ok(engine.clone());
        }

        let unavailable = |reason: &str| SpeechError::ProviderUnavailable {
            provider: descriptor.id.clone(),
            reason: reason.to_string(),
        };

        let credential = self.credentials.get(&descriptor.id);
        if descriptor.credential_required && credential.is_none() {
            return Err(unavailable("missing credentials"));
        }

        let endpoint = self.config.endpoint(&descriptor.id);
        let engine: Arc<dyn TtsEngine> = match descriptor.kind {
            ProviderKind::Espeak => {
                let binary = endpoint
                    .and_then(|e| e.endpoint.clone())
                    .unwrap_or_else(|| "espeak-ng".to_string());
                Arc::new(EspeakTtsEngine::with_binary(binary))
            }
            kind @ (ProviderKind::OpenAi
            | ProviderKind::GoogleCloud
            | ProviderKind::ElevenLabs
            | ProviderKind::NaverClova
            | ProviderKind::CustomHttp) => Arc::new(
                ApiTtsEngine::new(
                    kind,
                    descriptor.name.clone(),
                    endpoint.and_then(|e| e.endpoint.clone()),
                    credential,
                    endpoint.and_then(|e| e.model.clone()),
                    self.config.provider_timeout(),
                    self.config.retry.clone(),
                )
                .map_err(|e| unavailable(&e.to_string()))?,
            ),
        };
        Ok(engine)
    }

    /// Drop a cached instance so the next use reconstructs it
    pub fn invalidate(&self, provider_id: &str) {
        if self.instances.remove(provider_id).is_some() {
            info!(provider = %provider_id, "Provider instance invalidated");
        }
    }

    pub fn is_cached(&self, provider_id: &str) -> bool {
        self.instances.contains_key(provider_id)
    }

    pub fn record_success(&self, provider_id: &str, latency: Duration) {
        let mut stats = self.stats.write();
        let entry = stats
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderStats::new(provider_id));
        entry.successes += 1;
        entry.consecutive_failures = 0;
        let latency_ms = latency.as_micros() as f64 / 1000.0;
        entry.mean_latency_ms += (latency_ms - entry.mean_latency_ms) / entry.successes as f64;
        entry.last_used = Some(Utc::now());
    }

    /// Record a failed call. Returns true when the failure invalidated the instance.
    pub fn record_failure(&self, provider_id: &str, error: &str) -> bool {
        let consecutive = {
            let mut stats = self.stats.write();
            let entry = stats
                .entry(provider_id.to_string())
                .or_insert_with(|| ProviderStats::new(provider_id));
            entry.failures += 1;
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.last_error = Some(error.chars().take(500).collect());
            entry.last_used = Some(Utc::now());
            entry.consecutive_failures
        };

        if consecutive >= self.config.invalidate_after_failures {
            warn!(
                provider = %provider_id,
                consecutive_failures = consecutive,
                "Provider failing repeatedly"
            );
            self.invalidate(provider_id);
            return true;
        }
        false
    }

    pub fn stats(&self, provider_id: &str) -> Option<ProviderStats> {
        self.stats.read().get(provider_id).cloned()
    }

    /// Snapshot of all provider statistics, sorted by provider id
    pub fn all_stats(&self) -> Vec<ProviderStats> {
        let mut all: Vec<_> = self.stats.read().values().cloned().collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    fn prune_window(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether the provider's per-minute budget is used up
    pub fn rate_exhausted(&self, provider_id: &str) -> bool {
        let limit = match self.catalog.get(provider_id) {
            Some(d) => d.rate_limit_per_minute as usize,
            None => return true,
        };
        match self.rate_windows.get(provider_id) {
            Some(window) => {
                let mut window = window.lock();
                Self::prune_window(&mut window, Instant::now());
                window.len() >= limit
            }
            None => false,
        }
    }

    /// Take one slot from the provider's sliding one-minute window
    pub fn try_acquire_rate(&self, provider_id: &str) -> bool {
        let limit = match self.catalog.get(provider_id) {
            Some(d) => d.rate_limit_per_minute as usize,
            None => return false,
        };
        let window = self
            .rate_windows
            .entry(provider_id.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = window.lock();
        let now = Instant::now();
        Self::prune_window(&mut window, now);
        if window.len() >= limit {
            return false;
        }
        window.push_back(now);
        true
    }
}
