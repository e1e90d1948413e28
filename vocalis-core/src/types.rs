//! Request and result data model shared across the workspace

use crate::error::{Error, Result};
use crate::viseme::VisemeFrame;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type SessionId = String;
pub type UserId = String;

/// Maximum accepted request text, in bytes
pub const MAX_TEXT_BYTES: usize = 100_000;

/// Audio container produced by a synthesis backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ogg => "audio/ogg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(AudioFormat::Wav),
            "mp3" => Some(AudioFormat::Mp3),
            "ogg" | "oga" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }

    /// Sniff the container from magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            Some(AudioFormat::Wav)
        } else if data.len() >= 4 && &data[0..4] == b"OggS" {
            Some(AudioFormat::Ogg)
        } else if data.len() >= 3 && (&data[0..3] == b"ID3" || (data[0] == 0xFF && data[1] & 0xE0 == 0xE0)) {
            Some(AudioFormat::Mp3)
        } else {
            None
        }
    }
}

/// Billing tier of a backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CostTier {
    Free,
    FreeTier,
    Paid,
}

impl CostTier {
    pub fn rank(&self) -> i32 {
        match self {
            CostTier::Free => 0,
            CostTier::FreeTier => 1,
            CostTier::Paid => 2,
        }
    }
}

/// Perceived output quality of a backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Basic,
    Standard,
    High,
    Premium,
}

impl QualityTier {
    pub fn rank(&self) -> i32 {
        match self {
            QualityTier::Basic => 0,
            QualityTier::Standard => 1,
            QualityTier::High => 2,
            QualityTier::Premium => 3,
        }
    }
}

/// Emotion categories recognized by the animation planner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Calm,
    Mystic,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Calm,
        Emotion::Mystic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Calm => "calm",
            Emotion::Mystic => "mystic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// Requested voice prosody
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Prosody {
    /// Speaking speed multiplier (0.25-4.0, default 1.0)
    pub speed: f32,
    /// Pitch adjustment (-1.0 to 1.0, default 0.0)
    pub pitch: f32,
    /// Volume (0.0-1.0, default 1.0)
    pub volume: f32,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 0.0,
            volume: 1.0,
        }
    }
}

impl Prosody {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.speed.is_finite() || !(0.25..=4.0).contains(&self.speed) {
            return Err("Speed must be between 0.25 and 4.0".to_string());
        }
        if !self.pitch.is_finite() || !(-1.0..=1.0).contains(&self.pitch) {
            return Err("Pitch must be between -1.0 and 1.0".to_string());
        }
        if !self.volume.is_finite() || !(0.0..=1.0).contains(&self.volume) {
            return Err("Volume must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

/// Which animation channels the renderer wants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CapabilityFlags {
    pub lip_sync: bool,
    pub expressions: bool,
    pub motions: bool,
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        Self {
            lip_sync: true,
            expressions: true,
            motions: true,
        }
    }
}

/// A single text-to-animation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    /// BCP-47 style language code ("ko-KR", "en")
    pub language: String,
    pub voice: Option<String>,
    #[serde(default)]
    pub prosody: Prosody,
    pub emotion_hint: Option<Emotion>,
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Explicit provider requested by the caller
    pub provider_override: Option<String>,
    /// Free-form context tags ("tarot", "fortune")
    #[serde(default)]
    pub context: Vec<String>,
}

impl SynthesisRequest {
    pub fn new(
        session_id: impl Into<SessionId>,
        user_id: impl Into<UserId>,
        text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: None,
            prosody: Prosody::default(),
            emotion_hint: None,
            capabilities: CapabilityFlags::default(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            provider_override: None,
            context: Vec::new(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_prosody(mut self, prosody: Prosody) -> Self {
        self.prosody = prosody;
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion_hint = Some(emotion);
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityFlags) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_override = Some(provider.into());
        self
    }

    pub fn with_context(mut self, tag: impl Into<String>) -> Self {
        self.context.push(tag.into());
        self
    }

    /// Number of characters billed by providers
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Primary language subtag, lowercased ("ko-KR" -> "ko")
    pub fn primary_language(&self) -> String {
        primary_language(&self.language)
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidRequest("Text cannot be empty".to_string()));
        }
        if self.text.contains('\0') {
            return Err(Error::InvalidRequest("Text contains null bytes".to_string()));
        }
        if self.text.len() > MAX_TEXT_BYTES {
            return Err(Error::InvalidRequest(format!(
                "Text too long (max {} bytes)",
                MAX_TEXT_BYTES
            )));
        }
        validate_language(&self.language).map_err(Error::InvalidRequest)?;
        if self.session_id.is_empty() {
            return Err(Error::InvalidRequest("Session id cannot be empty".to_string()));
        }
        if let Some(ref voice) = self.voice {
            if voice.is_empty() || voice.len() > 256 || voice.chars().any(|c| c.is_control()) {
                return Err(Error::InvalidRequest("Invalid voice name".to_string()));
            }
        }
        self.prosody.validate().map_err(Error::InvalidRequest)?;
        Ok(())
    }
}

/// Primary language subtag, lowercased
pub fn primary_language(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}

/// Validate a language code such as "en-US" or "ko"
pub fn validate_language(language: &str) -> std::result::Result<(), String> {
    if language.is_empty() {
        return Err("Language code cannot be empty".to_string());
    }
    if language.len() > 32 {
        return Err("Language code too long (max 32 chars)".to_string());
    }
    if !language.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err("Language code contains invalid characters".to_string());
    }
    Ok(())
}

/// Where a result's duration came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurationSource {
    Measured,
    Estimated,
}

/// Cost accounting attached to a result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostMetadata {
    pub tier: CostTier,
    pub characters: usize,
    pub cache_hit: bool,
}

/// Output of a synthesis call. Ownership passes to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    #[serde(with = "audio_base64")]
    pub audio: Bytes,
    pub format: AudioFormat,
    /// Clip duration in seconds
    pub duration: f64,
    pub duration_source: DurationSource,
    pub provider: String,
    pub voice: String,
    #[serde(with = "duration_millis")]
    pub latency: Duration,
    pub cost: CostMetadata,
    /// Provider ids tried, in order, including the successful one
    pub attempts: Vec<String>,
    pub visemes: Option<Vec<VisemeFrame>>,
}

mod audio_base64 {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(audio))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        let request = SynthesisRequest::new("s1", "u1", "안녕하세요", "ko-KR");
        assert!(request.validate().is_ok());

        let empty = SynthesisRequest::new("s1", "u1", "   ", "ko-KR");
        assert!(matches!(empty.validate(), Err(Error::InvalidRequest(_))));

        let nul = SynthesisRequest::new("s1", "u1", "a\0b", "en");
        assert!(nul.validate().is_err());

        let bad_lang = SynthesisRequest::new("s1", "u1", "hi", "en US");
        assert!(bad_lang.validate().is_err());

        let mut bad_speed = SynthesisRequest::new("s1", "u1", "hi", "en");
        bad_speed.prosody.speed = 9.0;
        assert!(bad_speed.validate().is_err());
    }

    #[test]
    fn test_primary_language() {
        assert_eq!(primary_language("ko-KR"), "ko");
        assert_eq!(primary_language("EN_us"), "en");
        assert_eq!(primary_language("ja"), "ja");
    }

    #[test]
    fn test_format_sniffing() {
        assert_eq!(AudioFormat::sniff(b"RIFF\0\0\0\0WAVEfmt "), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::sniff(b"OggS\0\0"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::sniff(b"ID3\x04"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::sniff(b"nope"), None);
    }

    #[test]
    fn test_emotion_parse() {
        assert_eq!(Emotion::parse("JOY"), Some(Emotion::Joy));
        assert_eq!(Emotion::parse(" mystic "), Some(Emotion::Mystic));
        assert_eq!(Emotion::parse("bored"), None);
    }

    #[test]
    fn test_result_json_uses_base64_audio() {
        let result = SynthesisResult {
            audio: Bytes::from_static(&[1, 2, 3]),
            format: AudioFormat::Wav,
            duration: 1.5,
            duration_source: DurationSource::Measured,
            provider: "espeak".to_string(),
            voice: "ko".to_string(),
            latency: Duration::from_millis(120),
            cost: CostMetadata {
                tier: CostTier::Free,
                characters: 5,
                cache_hit: false,
            },
            attempts: vec!["espeak".to_string()],
            visemes: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["audio"], "AQID");
        assert_eq!(json["latency"], 120);
        assert_eq!(json["cost"]["tier"], "free");

        let back: SynthesisResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.audio.as_ref(), &[1, 2, 3]);
    }
}
