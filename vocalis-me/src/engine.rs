//! Top-level pipeline: synthesis, enhancement, remeasurement, analysis, planning, emission

use crate::command::{merge, AnimationCommand};
use crate::config::{AnimationConfig, VocalisConfig};
use crate::emitter::{ChannelSink, CommandSink, SessionRegistry, StreamOutcome, StreamToken, SyncEmitter};
use crate::emotion::{EmotionAnalysis, EmotionAnalyzer};
use crate::error::AnimationError;
use crate::timeline::{Timeline, TimelinePlanner};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vocalis_core::{
    AudioFormat, CostTier, DurationSource, QualityTier, SynthesisRequest, SynthesisResult, VisemeFrame,
};
use vocalis_sc::{AudioEnhancer, EnhancementProfile, EnhancementReport, ProcessedClip, VisemeAnalysis, VisemeAnalyzer};
use vocalis_spk::{
    AvailabilityCache, CredentialStore, EnvCredentials, InMemoryPreferenceStore, PreferenceStore, ProviderCatalog,
    ProviderRegistry, ProviderSelector, SpeechError, StatsSink, SynthesisInvoker, TracingStatsSink, TtsEngine,
};

/// Batch result of one request
#[derive(Debug, Clone, Serialize)]
pub struct AnimationOutput {
    pub result: SynthesisResult,
    pub emotion: EmotionAnalysis,
    pub timeline: Timeline,
    /// Timestamp-sorted commands for the renderer
    pub commands: Vec<AnimationCommand>,
    /// Absent when post-processing could not run
    pub enhancement: Option<EnhancementReport>,
}

/// Result of a paced stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamedOutput {
    pub output: AnimationOutput,
    pub outcome: StreamOutcome,
}

/// Catalog entry with its current health for one language
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub cost_tier: CostTier,
    pub quality_tier: QualityTier,
    pub languages: Vec<String>,
    pub credentials: bool,
    pub healthy: bool,
}

/// Builds an [`AnimationSyncEngine`] from configuration and injected collaborators
pub struct AnimationSyncEngineBuilder {
    config: VocalisConfig,
    catalog: Option<ProviderCatalog>,
    credentials: Arc<dyn CredentialStore>,
    preferences: Arc<dyn PreferenceStore>,
    stats_sink: Arc<dyn StatsSink>,
    engines: Vec<(String, Arc<dyn TtsEngine>)>,
}

impl AnimationSyncEngineBuilder {
    /// Replace the catalog derived from configuration
    pub fn catalog(mut self, catalog: ProviderCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn stats_sink(mut self, stats_sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = stats_sink;
        self
    }

    /// Inject an engine for a catalog entry
    pub fn engine(mut self, provider_id: impl Into<String>, engine: Arc<dyn TtsEngine>) -> Self {
        self.engines.push((provider_id.into(), engine));
        self
    }

    pub fn build(self) -> Result<AnimationSyncEngine, AnimationError> {
        self.config.validate().map_err(AnimationError::Config)?;
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => self.config.catalog().map_err(AnimationError::Config)?,
        };

        let registry = Arc::new(ProviderRegistry::new(
            catalog,
            self.config.speech.clone(),
            self.credentials,
        )?);
        for (id, engine) in self.engines {
            registry.register_engine(&id, engine)?;
        }

        let availability = Arc::new(AvailabilityCache::new(self.config.speech.availability_ttl()));
        let selector = ProviderSelector::new(Arc::clone(&registry), Arc::clone(&availability), self.preferences);
        let invoker = SynthesisInvoker::new(Arc::clone(&registry), availability, self.stats_sink);

        let animation = self.config.animation.clone();
        let engine = AnimationSyncEngine {
            selector,
            invoker,
            registry,
            enhancer: Arc::new(AudioEnhancer::new(self.config.enhancement.clone())?),
            analyzer: Arc::new(VisemeAnalyzer::new(self.config.analysis.clone())?),
            emotions: EmotionAnalyzer::new(),
            planner: TimelinePlanner::new(animation.clone()),
            sessions: Arc::new(SessionRegistry::new()),
            emitter: SyncEmitter::new(animation.pacing_interval()),
            permits: Arc::new(Semaphore::new(animation.max_concurrent_sessions)),
            animation,
        };

        info!(
            providers = engine.registry.catalog().len(),
            max_sessions = engine.animation.max_concurrent_sessions,
            "Animation sync engine ready"
        );
        Ok(engine)
    }
}

/// Turns a synthesis request into audio plus a synchronized animation command list
pub struct AnimationSyncEngine {
    selector: ProviderSelector,
    invoker: SynthesisInvoker,
    registry: Arc<ProviderRegistry>,
    enhancer: Arc<AudioEnhancer>,
    analyzer: Arc<VisemeAnalyzer>,
    emotions: EmotionAnalyzer,
    planner: TimelinePlanner,
    sessions: Arc<SessionRegistry>,
    emitter: SyncEmitter,
    permits: Arc<Semaphore>,
    animation: AnimationConfig,
}

struct PostProcessed {
    clip: ProcessedClip,
    analysis: Option<VisemeAnalysis>,
}

impl AnimationSyncEngine {
    pub fn builder(config: VocalisConfig) -> AnimationSyncEngineBuilder {
        AnimationSyncEngineBuilder {
            config,
            catalog: None,
            credentials: Arc::new(EnvCredentials),
            preferences: Arc::new(InMemoryPreferenceStore::new()),
            stats_sink: Arc::new(TracingStatsSink),
            engines: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn animation_config(&self) -> &AnimationConfig {
        &self.animation
    }

    /// Catalog entries supporting `language`, with credential and health state
    pub fn provider_status(&self, language: &str) -> Vec<ProviderStatus> {
        self.registry
            .catalog()
            .for_language(language)
            .map(|d| ProviderStatus {
                id: d.id.clone(),
                name: d.name.clone(),
                cost_tier: d.cost_tier,
                quality_tier: d.quality_tier,
                languages: d.languages.clone(),
                credentials: self.registry.has_credentials(d),
                healthy: self.selector.is_healthy(d, language),
            })
            .collect()
    }

    /// Run one request to completion and return the result with its command list.
    ///
    /// `AllProvidersFailed` is the only error after validation; every later
    /// stage degrades instead of failing.
    pub async fn process(&self, request: &SynthesisRequest) -> Result<AnimationOutput, AnimationError> {
        request.validate()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AnimationError::Worker("engine is shutting down".to_string()))?;

        let plan = match self.selector.select_for(request).await {
            Ok(plan) => plan,
            Err(SpeechError::NoProviderAvailable(language)) => {
                let attempted = self.selector.candidates_for(request).await;
                return Err(SpeechError::AllProvidersFailed { language, attempted }.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut result = self.invoker.synthesize(request, &plan).await?;
        let profile = if SynthesisInvoker::used_fallback(&result) {
            EnhancementProfile::Light
        } else {
            EnhancementProfile::Full
        };
        debug!(
            session = %request.session_id,
            provider = %result.provider,
            profile = ?profile,
            "Synthesis complete, post-processing"
        );

        let post = self
            .post_process(result.audio.clone(), result.format, profile, request)
            .await;

        let (enhancement, analysis) = match post {
            Some(PostProcessed { clip, analysis }) => {
                match clip.duration {
                    Some(measured) if measured.is_finite() && measured > 0.0 => {
                        if (measured - result.duration).abs() > 0.05 {
                            debug!(
                                session = %request.session_id,
                                estimated = result.duration,
                                measured,
                                "Measured duration replaces estimate"
                            );
                        }
                        result.duration = measured;
                        result.duration_source = DurationSource::Measured;
                    }
                    _ => {
                        warn!(
                            session = %request.session_id,
                            provider = %result.provider,
                            estimate = result.duration,
                            "Could not measure audio duration, keeping estimate"
                        );
                        result.duration_source = DurationSource::Estimated;
                    }
                }
                result.audio = clip.audio;
                result.format = clip.format;
                (Some(clip.report), analysis)
            }
            None => {
                result.duration_source = DurationSource::Estimated;
                (None, None)
            }
        };

        let duration = result.duration;
        let visemes = if request.capabilities.lip_sync {
            let mut frames = match analysis {
                Some(analysis) if !analysis.frames.is_empty() => analysis.frames,
                _ => vec![VisemeFrame::silence(0.0)],
            };
            frames.retain(|f| f.timestamp <= duration);
            frames
        } else {
            Vec::new()
        };

        let emotion = self.emotions.analyze(&request.text, request.emotion_hint);
        let timeline = self.planner.plan(
            &request.text,
            &emotion,
            duration,
            self.animation.intensity_base,
            &request.context,
        );
        let commands = merge(&timeline, &visemes, request.capabilities, self.animation.breath_intensity);
        result.visemes = request.capabilities.lip_sync.then_some(visemes);

        info!(
            session = %request.session_id,
            provider = %result.provider,
            duration = result.duration,
            duration_source = ?result.duration_source,
            emotion = emotion.primary.as_str(),
            commands = commands.len(),
            "Animation ready"
        );

        Ok(AnimationOutput {
            result,
            emotion,
            timeline,
            commands,
            enhancement,
        })
    }

    /// Enhancement and viseme analysis on the blocking pool
    async fn post_process(
        &self,
        audio: Bytes,
        format: AudioFormat,
        profile: EnhancementProfile,
        request: &SynthesisRequest,
    ) -> Option<PostProcessed> {
        let enhancer = Arc::clone(&self.enhancer);
        let analyzer = Arc::clone(&self.analyzer);
        let language = request.language.clone();
        let lip_sync = request.capabilities.lip_sync;

        let job = tokio::task::spawn_blocking(move || {
            let clip = enhancer.process_clip(&audio, format, profile);
            let analysis = match (&clip.samples, lip_sync) {
                (Some(samples), true) => Some(analyzer.analyze(samples, clip.sample_rate, Some(&language))),
                _ => None,
            };
            PostProcessed { clip, analysis }
        });

        match job.await {
            Ok(post) => Some(post),
            Err(e) => {
                warn!(session = %request.session_id, error = %e, "Post-processing task failed, delivering raw audio");
                None
            }
        }
    }

    /// Process a request and pace its commands into `sink`.
    ///
    /// Starting a stream supersedes any stream already running for the session.
    pub async fn stream(
        &self,
        request: &SynthesisRequest,
        sink: &dyn CommandSink,
    ) -> Result<StreamedOutput, AnimationError> {
        let token = self.sessions.begin(&request.session_id);
        self.run_stream(token, request, sink).await
    }

    /// Stream into a channel; the receiver yields commands as they come due
    pub fn stream_channel(
        self: &Arc<Self>,
        request: SynthesisRequest,
    ) -> (
        mpsc::Receiver<AnimationCommand>,
        JoinHandle<Result<StreamedOutput, AnimationError>>,
    ) {
        let (sink, rx) = ChannelSink::channel(self.animation.channel_buffer);
        let token = self.sessions.begin(&request.session_id);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_stream(token, &request, &sink).await });
        (rx, handle)
    }

    /// Stop the session's active stream, if any
    pub fn cancel(&self, session_id: &str) -> bool {
        self.sessions.cancel(session_id)
    }

    async fn run_stream(
        &self,
        token: StreamToken,
        request: &SynthesisRequest,
        sink: &dyn CommandSink,
    ) -> Result<StreamedOutput, AnimationError> {
        let output = match self.process(request).await {
            Ok(output) => output,
            Err(e) => {
                self.sessions.finish(&token);
                return Err(e);
            }
        };
        let outcome = self.emitter.emit_paced(&token, &output.commands, sink).await;
        self.sessions.finish(&token);
        Ok(StreamedOutput { output, outcome })
    }
}
