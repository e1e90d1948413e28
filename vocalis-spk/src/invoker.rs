//! Synthesis invoker: walks a provider plan with timeouts and failover

use crate::availability::AvailabilityCache;
use crate::cache::AudioCache;
use crate::engines::EngineRequest;
use crate::error::{ProviderErrorKind, SpeechError};
use crate::registry::ProviderRegistry;
use crate::selector::{PlannedProvider, ProviderPlan};
use crate::stats::{StatsSink, UsageRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vocalis_core::types::primary_language;
use vocalis_core::{AudioFormat, CostMetadata, DurationSource, SynthesisRequest, SynthesisResult};

const HANGUL_CHARS_PER_SEC: f64 = 7.0;
const OTHER_CHARS_PER_SEC: f64 = 14.0;

/// Pre-synthesis duration estimate in seconds
pub fn estimate_duration(text: &str, speed: f32) -> f64 {
    let (hangul, other) = text.chars().fold((0usize, 0usize), |(h, o), c| {
        if is_hangul(c) {
            (h + 1, o)
        } else if c.is_whitespace() {
            (h, o)
        } else {
            (h, o + 1)
        }
    });
    let seconds = hangul as f64 / HANGUL_CHARS_PER_SEC + other as f64 / OTHER_CHARS_PER_SEC;
    let speed = if speed.is_finite() && speed > 0.0 { speed as f64 } else { 1.0 };
    (seconds / speed).max(0.1)
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

/// Calls providers in plan order until one succeeds
pub struct SynthesisInvoker {
    registry: Arc<ProviderRegistry>,
    availability: Arc<AvailabilityCache>,
    stats_sink: Arc<dyn StatsSink>,
    cache: Option<AudioCache>,
    /// Bounds provider calls in flight across all sessions
    permits: Semaphore,
}

impl SynthesisInvoker {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        availability: Arc<AvailabilityCache>,
        stats_sink: Arc<dyn StatsSink>,
    ) -> Self {
        let config = registry.config();
        let cache = config
            .enable_cache
            .then(|| AudioCache::new(config.max_cache_size_mb));
        let permits = Semaphore::new(config.max_concurrent_requests);
        Self {
            registry,
            availability,
            stats_sink,
            cache,
            permits,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Whether a result came from a provider other than the first choice.
    /// Callers use this to pick a lighter post-processing profile.
    pub fn used_fallback(result: &SynthesisResult) -> bool {
        result.attempts.len() > 1
    }

    /// Synthesize with failover. `AllProvidersFailed` is the only terminal error.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        plan: &ProviderPlan,
    ) -> Result<SynthesisResult, SpeechError> {
        let characters = request.char_count();
        let cache_key = |planned: &PlannedProvider| {
            AudioCache::key(
                &request.text,
                &request.language,
                &planned.id,
                &planned.voice,
                &request.prosody,
            )
        };

        // Only the plan's primary may be served from cache
        let hit = match (self.cache.as_ref(), plan.primary()) {
            (Some(cache), Some(primary)) => cache.get(&cache_key(primary)),
            _ => None,
        };
        if let Some(hit) = hit {
            self.emit(UsageRecord {
                provider: hit.provider.clone(),
                session_id: request.session_id.clone(),
                success: true,
                characters,
                audio_duration: Some(hit.duration),
                latency_ms: 0,
                error_kind: None,
                cache_hit: true,
                timestamp: chrono::Utc::now(),
            });
            return Ok(SynthesisResult {
                audio: hit.audio,
                format: hit.format,
                duration: hit.duration,
                duration_source: DurationSource::Estimated,
                attempts: vec![hit.provider.clone()],
                provider: hit.provider,
                voice: hit.voice,
                latency: Duration::ZERO,
                cost: CostMetadata {
                    tier: hit.cost_tier,
                    characters,
                    cache_hit: true,
                },
                visemes: None,
            });
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SpeechError::Engine("synthesis invoker closed".to_string()))?;
        let timeout = self.registry.config().provider_timeout();
        let language_key = primary_language(&plan.language);
        let mut attempts = Vec::with_capacity(plan.len());

        for planned in &plan.chain {
            attempts.push(planned.id.clone());

            let descriptor = match self.registry.descriptor(&planned.id) {
                Some(d) => d,
                None => {
                    warn!(provider = %planned.id, "Planned provider missing from catalog");
                    continue;
                }
            };

            if characters > descriptor.max_input_length {
                debug!(provider = %planned.id, "Skipping provider: input too long");
                self.emit_failure(request, &planned.id, characters, Duration::ZERO, "input_too_long");
                continue;
            }

            if !self.registry.try_acquire_rate(&planned.id) {
                debug!(provider = %planned.id, "Skipping provider: rate limited");
                self.emit_failure(request, &planned.id, characters, Duration::ZERO, "rate_limited");
                continue;
            }

            let instance = match self.registry.instance(&planned.id) {
                Ok(instance) => instance,
                Err(e) => {
                    debug!(provider = %planned.id, error = %e, "Skipping unavailable provider");
                    self.availability.set(&planned.id, &language_key, false);
                    self.emit_failure(request, &planned.id, characters, Duration::ZERO, "unavailable");
                    continue;
                }
            };

            let engine_request = EngineRequest {
                text: request.text.clone(),
                language: request.language.clone(),
                voice: planned.voice.clone(),
                prosody: request.prosody,
            };

            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, instance.engine.synthesize(&engine_request)).await {
                Ok(Ok(output)) if output.audio.is_empty() => {
                    Err(SpeechError::Malformed("empty audio".to_string()).for_provider(&planned.id))
                }
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(e.for_provider(&planned.id)),
                Err(_) => Err(SpeechError::timeout(&planned.id, timeout.as_millis() as u64)),
            };
            let latency = started.elapsed();

            match outcome {
                Ok(output) => {
                    let format = output
                        .format
                        .or_else(|| AudioFormat::sniff(&output.audio))
                        .unwrap_or(descriptor.output_format);
                    let duration = output
                        .duration
                        .filter(|d| d.is_finite() && *d > 0.0)
                        .unwrap_or_else(|| estimate_duration(&request.text, request.prosody.speed));

                    self.registry.record_success(&planned.id, latency);
                    self.availability.set(&planned.id, &language_key, true);
                    self.emit(UsageRecord {
                        provider: planned.id.clone(),
                        session_id: request.session_id.clone(),
                        success: true,
                        characters,
                        audio_duration: Some(duration),
                        latency_ms: latency.as_millis() as u64,
                        error_kind: None,
                        cache_hit: false,
                        timestamp: chrono::Utc::now(),
                    });

                    if let Some(ref cache) = self.cache {
                        cache.insert(
                            cache_key(planned),
                            output.audio.clone(),
                            format,
                            duration,
                            &planned.id,
                            &planned.voice,
                            descriptor.cost_tier,
                        );
                    }

                    if attempts.len() > 1 {
                        info!(
                            provider = %planned.id,
                            session = %request.session_id,
                            tried = ?attempts,
                            "Synthesis succeeded on fallback provider"
                        );
                    }

                    return Ok(SynthesisResult {
                        audio: output.audio,
                        format,
                        duration,
                        duration_source: DurationSource::Estimated,
                        provider: planned.id.clone(),
                        voice: planned.voice.clone(),
                        latency,
                        cost: CostMetadata {
                            tier: descriptor.cost_tier,
                            characters,
                            cache_hit: false,
                        },
                        attempts,
                        visemes: None,
                    });
                }
                Err(e) => {
                    let kind = match &e {
                        SpeechError::ProviderError { kind, .. } => kind.to_string(),
                        SpeechError::ProviderUnavailable { .. } => "unavailable".to_string(),
                        _ => ProviderErrorKind::Engine.to_string(),
                    };
                    warn!(
                        provider = %planned.id,
                        session = %request.session_id,
                        error = %e,
                        "Provider call failed, trying next"
                    );

                    if e.is_unavailable() {
                        self.availability.set(&planned.id, &language_key, false);
                    } else {
                        self.registry.record_failure(&planned.id, &e.to_string());
                        self.availability.invalidate_provider(&planned.id);
                    }
                    self.emit_failure(request, &planned.id, characters, latency, &kind);
                }
            }
        }

        Err(SpeechError::AllProvidersFailed {
            language: plan.language.clone(),
            attempted: attempts,
        })
    }

    fn emit(&self, record: UsageRecord) {
        self.stats_sink.record(&record);
    }

    fn emit_failure(&self, request: &SynthesisRequest, provider: &str, characters: usize, latency: Duration, kind: &str) {
        self.emit(UsageRecord {
            provider: provider.to_string(),
            session_id: request.session_id.clone(),
            success: false,
            characters,
            audio_duration: None,
            latency_ms: latency.as_millis() as u64,
            error_kind: Some(kind.to_string()),
            cache_hit: false,
            timestamp: chrono::Utc::now(),
        });
    }
}
