//! Fallback-chain construction

use crate::availability::AvailabilityCache;
use crate::catalog::{ProviderCatalog, ProviderDescriptor};
use crate::config::SelectionMode;
use crate::error::SpeechError;
use crate::preferences::{PreferenceStore, UserPreference};
use crate::registry::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, warn};
use vocalis_core::types::primary_language;
use vocalis_core::SynthesisRequest;

/// One provider in a plan with the voice it will be asked for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedProvider {
    pub id: String,
    pub voice: String,
}

/// Ordered fallback chain for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderPlan {
    pub language: String,
    pub chain: Vec<PlannedProvider>,
}

impl ProviderPlan {
    pub fn primary(&self) -> Option<&PlannedProvider> {
        self.chain.first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.chain.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// Builds fallback chains from preferences, configuration and cached health
pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    availability: Arc<AvailabilityCache>,
    preferences: Arc<dyn PreferenceStore>,
}

impl ProviderSelector {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        availability: Arc<AvailabilityCache>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            registry,
            availability,
            preferences,
        }
    }

    /// Select providers for a user and language
    pub async fn select(
        &self,
        user_id: &str,
        language: &str,
        provider_override: Option<&str>,
    ) -> Result<ProviderPlan, SpeechError> {
        self.build_plan(user_id, language, provider_override, None, None)
            .await
    }

    /// Select providers for a request, honoring its voice and input length
    pub async fn select_for(&self, request: &SynthesisRequest) -> Result<ProviderPlan, SpeechError> {
        self.build_plan(
            &request.user_id,
            &request.language,
            request.provider_override.as_deref(),
            request.voice.as_deref(),
            Some(request.char_count()),
        )
        .await
    }

    /// Candidate order for a request with the user's stored preference applied
    pub async fn candidates_for(&self, request: &SynthesisRequest) -> Vec<String> {
        let preference = self.preferences.get(&request.user_id).await;
        self.candidate_order(
            &request.language,
            request.provider_override.as_deref(),
            preference.as_ref(),
        )
    }

    async fn build_plan(
        &self,
        user_id: &str,
        language: &str,
        provider_override: Option<&str>,
        requested_voice: Option<&str>,
        char_count: Option<usize>,
    ) -> Result<ProviderPlan, SpeechError> {
        let preference = self.preferences.get(user_id).await;
        let candidates = self.candidate_order(language, provider_override, preference.as_ref());
        let voice = requested_voice.or_else(|| preference.as_ref().and_then(|p| p.voice.as_deref()));

        let mut chain = Vec::new();
        for id in candidates {
            let descriptor = match self.registry.descriptor(&id) {
                Some(d) => d,
                None => continue,
            };
            if let Some(chars) = char_count {
                if chars > descriptor.max_input_length {
                    debug!(provider = %id, chars, "Input too long for provider");
                    continue;
                }
            }
            if self.registry.rate_exhausted(&id) {
                debug!(provider = %id, "Provider rate limit exhausted");
                continue;
            }
            if !self.is_healthy(descriptor, language) {
                continue;
            }
            chain.push(PlannedProvider {
                voice: resolve_voice(descriptor, language, voice),
                id,
            });
        }

        if chain.is_empty() {
            warn!(language = %language, "No provider available");
            return Err(SpeechError::NoProviderAvailable(language.to_string()));
        }

        let plan = ProviderPlan {
            language: language.to_string(),
            chain,
        };
        debug!(language = %language, chain = ?plan.ids(), "Provider plan built");
        Ok(plan)
    }

    /// Candidate ids in priority order, before health filtering
    pub fn candidate_order(
        &self,
        language: &str,
        provider_override: Option<&str>,
        preference: Option<&UserPreference>,
    ) -> Vec<String> {
        let catalog = self.registry.catalog();
        let config = self.registry.config();
        let mut order: Vec<String> = Vec::new();

        if let Some(id) = provider_override {
            match catalog.get(id) {
                Some(d) if d.supports_language(language) => order.push(id.to_string()),
                Some(_) => warn!(provider = %id, language = %language, "Override does not support language"),
                None => warn!(provider = %id, "Unknown provider override ignored"),
            }
        }

        if let Some(pref) = preference {
            if let Some(ref id) = pref.preferred_provider {
                order.push(id.clone());
            }
            order.extend(pref.fallback_chain.iter().cloned());
        }

        let mode = preference.and_then(|p| p.mode).unwrap_or(config.mode);
        match config.fallback_chains.get(&primary_language(language)) {
            Some(chain) => order.extend(chain.iter().cloned()),
            None => order.extend(mode_chain(catalog, language, mode)),
        }

        // Remaining providers, catalog order
        order.extend(catalog.for_language(language).map(|d| d.id.clone()));

        let mut seen = std::collections::HashSet::new();
        order.retain(|id| {
            catalog.get(id).map(|d| d.supports_language(language)).unwrap_or(false)
                && !config.is_disabled(id)
                && seen.insert(id.clone())
        });
        order
    }

    /// Cached health, probing only when no fresh entry exists
    pub fn is_healthy(&self, descriptor: &ProviderDescriptor, language: &str) -> bool {
        let language_key = primary_language(language);
        if let Some(healthy) = self.availability.get(&descriptor.id, &language_key) {
            return healthy;
        }
        let healthy = self.probe(descriptor, language);
        self.availability.set(&descriptor.id, &language_key, healthy);
        healthy
    }

    fn probe(&self, descriptor: &ProviderDescriptor, language: &str) -> bool {
        if !descriptor.supports_language(language) {
            return false;
        }
        if !self.registry.has_credentials(descriptor) {
            debug!(provider = %descriptor.id, "Probe failed: missing credentials");
            return false;
        }
        match self.registry.instance(&descriptor.id) {
            Ok(instance) => {
                let available = instance.engine.is_available();
                if !available {
                    debug!(provider = %descriptor.id, "Probe failed: engine unavailable");
                }
                available
            }
            Err(e) => {
                debug!(provider = %descriptor.id, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Provider ids supporting a language, ordered by selection mode
pub fn mode_chain(catalog: &ProviderCatalog, language: &str, mode: SelectionMode) -> Vec<String> {
    let mut providers: Vec<(usize, &ProviderDescriptor)> = catalog.for_language(language).enumerate().collect();

    // sort_by_key is stable, so ties keep catalog order
    match mode {
        SelectionMode::CostOptimized => {
            providers.sort_by_key(|(_, d)| (d.cost_tier.rank(), Reverse(d.quality_tier.rank())))
        }
        SelectionMode::QualityOptimized => {
            providers.sort_by_key(|(_, d)| (Reverse(d.quality_tier.rank()), d.cost_tier.rank()))
        }
        SelectionMode::Balanced => {
            providers.sort_by_key(|(_, d)| Reverse(d.quality_tier.rank() - d.cost_tier.rank()))
        }
    }

    providers.into_iter().map(|(_, d)| d.id.clone()).collect()
}

/// Requested voice when the provider offers it, else the provider default
fn resolve_voice(descriptor: &ProviderDescriptor, language: &str, requested: Option<&str>) -> String {
    match requested {
        Some(voice) if descriptor.accepts_voice(language, voice) => voice.to_string(),
        _ => descriptor.default_voice(language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_chains() {
        let catalog = ProviderCatalog::builtin();

        let cost = mode_chain(&catalog, "ko", SelectionMode::CostOptimized);
        assert_eq!(cost[0], "espeak");
        assert_eq!(cost[1], "google_cloud");

        let quality = mode_chain(&catalog, "ko", SelectionMode::QualityOptimized);
        assert_eq!(quality[0], "elevenlabs");
        assert_eq!(quality.last().map(String::as_str), Some("espeak"));

        // premium/paid and high/free-tier tie at +1; ties keep catalog order
        let balanced = mode_chain(&catalog, "ko", SelectionMode::Balanced);
        assert_eq!(balanced, vec!["elevenlabs", "google_cloud", "naver_clova", "openai", "espeak"]);
    }

    #[test]
    fn test_voice_resolution() {
        let catalog = ProviderCatalog::builtin();
        let clova = catalog.get("naver_clova").unwrap();
        assert_eq!(resolve_voice(clova, "ko-KR", Some("jinho")), "jinho");
        assert_eq!(resolve_voice(clova, "ko-KR", Some("alloy")), "nara");
        assert_eq!(resolve_voice(clova, "ko-KR", None), "nara");
    }
}
