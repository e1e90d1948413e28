//! vocalis-sc: sound processing for synthesized speech
//!
//! Provides:
//! - WAV/MP3/OGG decoding, WAV re-encoding and duration measurement
//! - An STFT with exact overlap-add resynthesis
//! - A fail-soft enhancement pipeline (noise reduction, formant boost, loudness)
//! - Viseme analysis (LPC formants, vowel classification, mouth parameters)

pub mod error;
pub mod config;
pub mod codec;
pub mod stft;
pub mod enhancement;
pub mod viseme;

pub use error::AudioError;
pub use config::{
    AnalysisConfig, EnhancementConfig, EnhancementLevel, EnhancementProfile, FormantBand, FormantRange,
    FormantTable,
};
pub use codec::{decode, encode_wav, measure_duration, DecodedAudio};
pub use stft::Stft;
pub use enhancement::{AudioEnhancer, EnhancementReport, ProcessedClip, Stage, StageStatus};
pub use viseme::{AnalyzerState, FormantMethod, VisemeAnalysis, VisemeAnalyzer};
