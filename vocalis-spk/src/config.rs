//! Configuration for provider selection and synthesis

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Default ordering strategy when no explicit chain applies
    pub mode: SelectionMode,

    /// Per-provider call timeout in milliseconds
    pub provider_timeout_ms: u64,

    /// How long a cached availability result stays fresh
    pub availability_ttl_secs: u64,

    /// Consecutive failures before a cached provider instance is dropped
    pub invalidate_after_failures: u32,

    /// Explicit fallback chains keyed by primary language subtag
    pub fallback_chains: HashMap<String, Vec<String>>,

    /// Providers never selected
    pub disabled_providers: Vec<String>,

    /// Endpoint/model overrides keyed by provider id
    pub endpoints: HashMap<String, EndpointConfig>,

    /// Cache synthesized audio
    pub enable_cache: bool,

    /// Maximum audio cache size in MB
    pub max_cache_size_mb: u64,

    /// Maximum concurrent synthesis requests
    pub max_concurrent_requests: usize,

    /// Retry configuration for HTTP engines
    pub retry: RetryConfig,
}

/// Fallback chain ordering strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    CostOptimized,
    QualityOptimized,
    Balanced,
}

/// Endpoint override for a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Retry configuration for API calls.
///
/// Retries run inside one provider attempt and share its `provider_timeout_ms`,
/// so every retry delays the move to the next provider in the chain. The
/// default is no in-engine retry; failover is the retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts
    pub max_retries: u32,

    /// Initial retry delay in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Balanced,
            provider_timeout_ms: 15_000,
            availability_ttl_secs: 120,
            invalidate_after_failures: 3,
            fallback_chains: HashMap::new(),
            disabled_providers: Vec::new(),
            endpoints: HashMap::new(),
            enable_cache: true,
            max_cache_size_mb: 64,
            max_concurrent_requests: 64,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries > 10 {
            return Err("Max retries too large (max 10)".to_string());
        }

        if self.initial_delay_ms > 60_000 {
            return Err("Initial delay too large (max 60000 ms)".to_string());
        }

        if self.max_delay_ms > 300_000 {
            return Err("Max delay too large (max 300000 ms)".to_string());
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }

        Ok(())
    }
}

impl SpeechConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn availability_ttl(&self) -> Duration {
        Duration::from_secs(self.availability_ttl_secs)
    }

    pub fn endpoint(&self, provider_id: &str) -> Option<&EndpointConfig> {
        self.endpoints.get(provider_id)
    }

    pub fn is_disabled(&self, provider_id: &str) -> bool {
        self.disabled_providers.iter().any(|p| p == provider_id)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_timeout_ms == 0 {
            return Err("Provider timeout must be greater than 0".to_string());
        }

        if self.provider_timeout_ms > 300_000 {
            return Err("Provider timeout too large (max 300000 ms)".to_string());
        }

        // Availability is meant to be a short-lived cache (minutes)
        if self.availability_ttl_secs == 0 || self.availability_ttl_secs > 3600 {
            return Err("Availability TTL must be between 1 and 3600 seconds".to_string());
        }

        if self.invalidate_after_failures == 0 {
            return Err("invalidate_after_failures must be at least 1".to_string());
        }

        if self.max_cache_size_mb > 10_000 {
            return Err("Cache size too large (max 10000 MB)".to_string());
        }

        if self.max_concurrent_requests == 0 || self.max_concurrent_requests > 10_000 {
            return Err("max_concurrent_requests must be between 1 and 10000".to_string());
        }

        for (language, chain) in &self.fallback_chains {
            if chain.is_empty() {
                return Err(format!("Fallback chain for '{}' is empty", language));
            }
        }

        for (provider, endpoint) in &self.endpoints {
            if let Some(ref url) = endpoint.endpoint {
                let parsed = url::Url::parse(url)
                    .map_err(|e| format!("Invalid endpoint for '{}': {}", provider, e))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!(
                        "Endpoint for '{}' must use http:// or https://",
                        provider
                    ));
                }
            }
            if let Some(ref model) = endpoint.model {
                if model.len() > 256 || model.chars().any(|c| c == '\0' || c.is_control()) {
                    return Err(format!("Invalid model name for '{}'", provider));
                }
            }
        }

        self.retry.validate()
    }
}
