//! vocalis-core: shared building blocks for the vocalis workspace
//!
//! Provides:
//! - The workspace-wide error type
//! - Request/result data model shared by synthesis, analysis and animation
//! - Viseme frame types
//! - Layered configuration loading (defaults, TOML file, environment)

pub mod error;
pub mod types;
pub mod viseme;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    AudioFormat, CapabilityFlags, CostMetadata, CostTier, DurationSource, Emotion, Prosody,
    QualityTier, SessionId, SynthesisRequest, SynthesisResult, UserId,
};
pub use viseme::{MouthParams, VisemeCategory, VisemeFrame};
pub use config::load_layered;
