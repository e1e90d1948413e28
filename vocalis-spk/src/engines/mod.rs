//! TTS engine implementations

pub mod api;
pub mod local;
pub mod custom;

pub use api::ApiTtsEngine;
pub use custom::CustomTtsEngine;
pub use local::EspeakTtsEngine;

use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use vocalis_core::{AudioFormat, Prosody};

/// Parameters for a single engine call
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub text: String,
    pub language: String,
    pub voice: String,
    pub prosody: Prosody,
}

/// Raw audio returned by an engine
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub audio: Bytes,
    /// Container, when the engine knows it
    pub format: Option<AudioFormat>,
    /// Duration in seconds, when the engine reports one
    pub duration: Option<f64>,
}

impl EngineOutput {
    pub fn new(audio: Bytes, format: AudioFormat) -> Self {
        Self {
            audio,
            format: Some(format),
            duration: None,
        }
    }
}

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize text to speech audio
    async fn synthesize(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError>;

    /// Get available voices for a language
    async fn list_voices(&self, language: &str) -> Result<Vec<String>, SpeechError>;

    /// Check if engine is available
    fn is_available(&self) -> bool;

    /// Get engine name
    fn name(&self) -> &str;
}

/// Strip control characters and cap length
pub(crate) fn sanitize_text(text: &str, max_chars: usize) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(max_chars)
        .collect()
}

/// Truncate an error body for logging
pub(crate) fn truncate_body(body: String) -> String {
    if body.chars().count() > 1000 {
        let truncated: String = body.chars().take(1000).collect();
        format!("{}...", truncated)
    } else {
        body
    }
}
