//! Error types for vocalis-me

use thiserror::Error;
use vocalis_core::Error as CoreError;
use vocalis_sc::AudioError;
use vocalis_spk::SpeechError;

/// Animation pipeline errors
#[derive(Error, Debug)]
pub enum AnimationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SpeechError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AnimationError> for CoreError {
    fn from(err: AnimationError) -> Self {
        match err {
            AnimationError::Core(inner) => inner,
            AnimationError::InvalidRequest(msg) => CoreError::InvalidRequest(msg),
            AnimationError::Config(msg) => CoreError::Configuration(msg),
            AnimationError::Synthesis(e) => e.into(),
            AnimationError::Audio(e) => e.into(),
            other => CoreError::Animation(other.to_string()),
        }
    }
}
