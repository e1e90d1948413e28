//! Local espeak-ng engine

use crate::engines::{sanitize_text, EngineOutput, EngineRequest, TtsEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{info, warn};
use vocalis_core::{AudioFormat, Prosody};

const MAX_AUDIO_SIZE: usize = 10 * 1024 * 1024;

/// espeak-ng driven through its command line, writing WAV to stdout
pub struct EspeakTtsEngine {
    binary: String,
    available: bool,
}

impl EspeakTtsEngine {
    pub fn new() -> Self {
        Self::with_binary("espeak-ng")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let available = std::process::Command::new(&binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if available {
            info!("Local TTS engine '{}' found", binary);
        } else {
            warn!("Local TTS engine '{}' not found, provider disabled", binary);
        }

        Self { binary, available }
    }
}

impl Default for EspeakTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Words per minute, amplitude (0-200) and pitch (0-99) for espeak
fn espeak_args(prosody: &Prosody) -> (u32, u32, u32) {
    let wpm = (175.0 * prosody.speed).round().clamp(80.0, 450.0) as u32;
    let amplitude = (prosody.volume * 100.0).round().clamp(0.0, 200.0) as u32;
    let pitch = (50.0 + prosody.pitch * 49.0).round().clamp(0.0, 99.0) as u32;
    (wpm, amplitude, pitch)
}

/// Voice names are passed as arguments; keep them to the characters espeak uses
fn valid_voice(voice: &str) -> bool {
    !voice.is_empty()
        && voice.len() <= 64
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '/'))
}

#[async_trait]
impl TtsEngine for EspeakTtsEngine {
    async fn synthesize(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        if !self.available {
            return Err(SpeechError::Unavailable(format!("{} not installed", self.binary)));
        }

        let text = sanitize_text(&request.text, 100_000).replace('\n', " ");
        if text.trim().is_empty() {
            return Err(SpeechError::Engine("Text is empty after sanitization".to_string()));
        }

        let voice = if valid_voice(&request.voice) {
            request.voice.clone()
        } else {
            vocalis_core::types::primary_language(&request.language)
        };

        let (wpm, amplitude, pitch) = espeak_args(&request.prosody);

        let output = Command::new(&self.binary)
            .arg("--stdout")
            .arg("-v")
            .arg(&voice)
            .arg("-s")
            .arg(wpm.to_string())
            .arg("-a")
            .arg(amplitude.to_string())
            .arg("-p")
            .arg(pitch.to_string())
            .arg("--")
            .arg(&text)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SpeechError::Engine(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "{} failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        if output.stdout.len() > MAX_AUDIO_SIZE {
            return Err(SpeechError::Malformed(format!(
                "Generated audio too large ({} bytes, max {} bytes)",
                output.stdout.len(),
                MAX_AUDIO_SIZE
            )));
        }
        if output.stdout.is_empty() {
            return Err(SpeechError::Malformed("espeak produced no audio".to_string()));
        }

        Ok(EngineOutput::new(Bytes::from(output.stdout), AudioFormat::Wav))
    }

    async fn list_voices(&self, language: &str) -> Result<Vec<String>, SpeechError> {
        if !self.available {
            return Ok(Vec::new());
        }

        let primary = vocalis_core::types::primary_language(language);
        let output = Command::new(&self.binary)
            .arg(format!("--voices={}", primary))
            .output()
            .await
            .map_err(|e| SpeechError::Engine(format!("Failed to list voices: {}", e)))?;

        if !output.status.success() {
            return Ok(Vec::new());
        }

        // Columns: Pty Language Age/Gender VoiceName File Other
        let voices = String::from_utf8_lossy(&output.stdout)
            .lines()
            .skip(1)
            .filter_map(|line| line.split_whitespace().nth(4).map(str::to_string))
            .filter(|v| valid_voice(v))
            .take(1000)
            .collect();

        Ok(voices)
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "espeak"
    }
}
