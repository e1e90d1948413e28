//! vocalis-spk: speech synthesis with provider failover
//!
//! Provides:
//! - A static provider catalog (languages, voices, cost/quality tiers, limits)
//! - API, local and injectable TTS engines behind one trait
//! - A lazily populated provider registry with failure-driven invalidation
//! - Availability caching and ordered fallback-chain selection
//! - A synthesis invoker with per-call timeouts, failover and usage telemetry

pub mod error;
pub mod config;
pub mod catalog;
pub mod engines;
pub mod credentials;
pub mod preferences;
pub mod registry;
pub mod availability;
pub mod selector;
pub mod stats;
pub mod cache;
pub mod invoker;

pub use error::{ProviderErrorKind, SpeechError};
pub use config::{EndpointConfig, RetryConfig, SelectionMode, SpeechConfig};
pub use catalog::{ProviderCatalog, ProviderDescriptor, ProviderKind, ANY_LANGUAGE};
pub use engines::{ApiTtsEngine, CustomTtsEngine, EngineOutput, EngineRequest, EspeakTtsEngine, TtsEngine};
pub use credentials::{Credential, CredentialStore, EnvCredentials, StaticCredentials};
pub use preferences::{InMemoryPreferenceStore, PreferenceStore, UserPreference};
pub use registry::{ProviderInstance, ProviderRegistry, ProviderStats};
pub use availability::AvailabilityCache;
pub use selector::{mode_chain, PlannedProvider, ProviderPlan, ProviderSelector};
pub use stats::{MemoryStatsSink, StatsSink, TracingStatsSink, UsageRecord};
pub use cache::{AudioCache, CachedAudio};
pub use invoker::{estimate_duration, SynthesisInvoker};
