//! Static descriptors of the synthesis backends

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vocalis_core::types::primary_language;
use vocalis_core::{AudioFormat, CostTier, QualityTier};

/// Language key matching any language
pub const ANY_LANGUAGE: &str = "*";

/// Which engine implementation constructs a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI speech API
    OpenAi,
    /// Google Cloud Text-to-Speech
    GoogleCloud,
    /// ElevenLabs
    ElevenLabs,
    /// Naver Clova Voice
    NaverClova,
    /// Local espeak-ng
    Espeak,
    /// Generic HTTP endpoint
    CustomHttp,
}

/// Immutable description of one synthesis backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    pub cost_tier: CostTier,
    pub quality_tier: QualityTier,
    /// Primary language subtags, or "*"
    pub languages: Vec<String>,
    /// Voices per primary language subtag ("*" applies to all); first is the default
    pub voices: HashMap<String, Vec<String>>,
    pub credential_required: bool,
    /// Maximum input length in characters
    pub max_input_length: usize,
    pub rate_limit_per_minute: u32,
    pub output_format: AudioFormat,
}

impl ProviderDescriptor {
    /// Descriptor for an injected or generic HTTP provider
    pub fn custom(id: impl Into<String>, languages: &[&str], cost_tier: CostTier, quality_tier: QualityTier) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: ProviderKind::CustomHttp,
            cost_tier,
            quality_tier,
            languages: langs(languages),
            voices: HashMap::new(),
            credential_required: false,
            max_input_length: 100_000,
            rate_limit_per_minute: 600,
            output_format: AudioFormat::Wav,
        }
    }

    pub fn with_voices(mut self, language: &str, voices: &[&str]) -> Self {
        self.voices.insert(
            language.to_string(),
            voices.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_limits(mut self, max_input_length: usize, rate_limit_per_minute: u32) -> Self {
        self.max_input_length = max_input_length;
        self.rate_limit_per_minute = rate_limit_per_minute;
        self
    }

    pub fn supports_language(&self, language: &str) -> bool {
        let primary = primary_language(language);
        self.languages
            .iter()
            .any(|l| l == ANY_LANGUAGE || l.eq_ignore_ascii_case(&primary))
    }

    fn voices_for(&self, language: &str) -> Option<&Vec<String>> {
        let primary = primary_language(language);
        self.voices
            .get(&primary)
            .or_else(|| self.voices.get(ANY_LANGUAGE))
    }

    /// Default voice for a language; falls back to the language code itself
    pub fn default_voice(&self, language: &str) -> String {
        self.voices_for(language)
            .and_then(|v| v.first().cloned())
            .unwrap_or_else(|| primary_language(language))
    }

    /// Whether a voice can be requested for a language.
    /// Providers that publish no voice list accept any voice.
    pub fn accepts_voice(&self, language: &str, voice: &str) -> bool {
        match self.voices_for(language) {
            Some(voices) if !voices.is_empty() => voices.iter().any(|v| v == voice),
            _ => true,
        }
    }
}

/// The set of known providers, in preference order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCatalog {
    descriptors: Vec<ProviderDescriptor>,
}

impl ProviderCatalog {
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Result<Self, String> {
        let catalog = Self { descriptors };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Built-in providers
    pub fn builtin() -> Self {
        Self {
            descriptors: vec![
                ProviderDescriptor {
                    id: "naver_clova".to_string(),
                    name: "Naver Clova Voice".to_string(),
                    kind: ProviderKind::NaverClova,
                    cost_tier: CostTier::Paid,
                    quality_tier: QualityTier::High,
                    languages: langs(&["ko", "en", "ja", "zh", "es"]),
                    voices: voices(&[
                        ("ko", &["nara", "jinho", "nminseo", "nshasha"]),
                        ("en", &["clara", "matt"]),
                        ("ja", &["shinji", "ntomoko"]),
                        ("zh", &["meimei", "liangliang"]),
                        ("es", &["carmen", "jose"]),
                    ]),
                    credential_required: true,
                    max_input_length: 2000,
                    rate_limit_per_minute: 60,
                    output_format: AudioFormat::Mp3,
                },
                ProviderDescriptor {
                    id: "openai".to_string(),
                    name: "OpenAI TTS".to_string(),
                    kind: ProviderKind::OpenAi,
                    cost_tier: CostTier::Paid,
                    quality_tier: QualityTier::High,
                    languages: langs(&[ANY_LANGUAGE]),
                    voices: voices(&[(
                        ANY_LANGUAGE,
                        &["nova", "alloy", "shimmer", "echo", "fable", "onyx"],
                    )]),
                    credential_required: true,
                    max_input_length: 4096,
                    rate_limit_per_minute: 50,
                    output_format: AudioFormat::Mp3,
                },
                ProviderDescriptor {
                    id: "elevenlabs".to_string(),
                    name: "ElevenLabs".to_string(),
                    kind: ProviderKind::ElevenLabs,
                    cost_tier: CostTier::Paid,
                    quality_tier: QualityTier::Premium,
                    languages: langs(&["en", "ko", "ja", "zh", "es", "fr", "de", "it", "pt"]),
                    voices: voices(&[(ANY_LANGUAGE, &["21m00Tcm4TlvDq8ikWAM", "EXAVITQu4vr4xnSDxMaL"])]),
                    credential_required: true,
                    max_input_length: 5000,
                    rate_limit_per_minute: 30,
                    output_format: AudioFormat::Mp3,
                },
                ProviderDescriptor {
                    id: "google_cloud".to_string(),
                    name: "Google Cloud TTS".to_string(),
                    kind: ProviderKind::GoogleCloud,
                    cost_tier: CostTier::FreeTier,
                    quality_tier: QualityTier::High,
                    languages: langs(&["ko", "en", "ja", "zh", "es", "fr", "de"]),
                    voices: voices(&[
                        ("ko", &["ko-KR-Wavenet-A", "ko-KR-Standard-A", "ko-KR-Wavenet-C"]),
                        ("en", &["en-US-Wavenet-F", "en-US-Standard-C", "en-US-Wavenet-D"]),
                        ("ja", &["ja-JP-Wavenet-B", "ja-JP-Standard-A"]),
                        ("zh", &["cmn-CN-Wavenet-A"]),
                        ("es", &["es-ES-Wavenet-C"]),
                        ("fr", &["fr-FR-Wavenet-A"]),
                        ("de", &["de-DE-Wavenet-A"]),
                    ]),
                    credential_required: true,
                    max_input_length: 5000,
                    rate_limit_per_minute: 100,
                    output_format: AudioFormat::Wav,
                },
                ProviderDescriptor {
                    id: "espeak".to_string(),
                    name: "eSpeak NG (local)".to_string(),
                    kind: ProviderKind::Espeak,
                    cost_tier: CostTier::Free,
                    quality_tier: QualityTier::Basic,
                    languages: langs(&[ANY_LANGUAGE]),
                    voices: HashMap::new(),
                    credential_required: false,
                    max_input_length: 100_000,
                    rate_limit_per_minute: 600,
                    output_format: AudioFormat::Wav,
                },
            ],
        }
    }

    /// Validate catalog (unique, well-formed ids)
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for descriptor in &self.descriptors {
            if descriptor.id.is_empty() || descriptor.id.len() > 64 {
                return Err("Provider id must be 1-64 characters".to_string());
            }
            if !descriptor
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
            {
                return Err(format!(
                    "Provider id '{}' must be lowercase alphanumeric, '_' or '-'",
                    descriptor.id
                ));
            }
            if !seen.insert(descriptor.id.as_str()) {
                return Err(format!("Duplicate provider id '{}'", descriptor.id));
            }
            if descriptor.languages.is_empty() {
                return Err(format!("Provider '{}' lists no languages", descriptor.id));
            }
            if descriptor.max_input_length == 0 || descriptor.rate_limit_per_minute == 0 {
                return Err(format!(
                    "Provider '{}' needs non-zero input length and rate limit",
                    descriptor.id
                ));
            }
        }
        Ok(())
    }

    /// Add a descriptor, replacing any existing one with the same id
    pub fn upsert(&mut self, descriptor: ProviderDescriptor) {
        match self.descriptors.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn for_language<'a>(&'a self, language: &'a str) -> impl Iterator<Item = &'a ProviderDescriptor> + 'a {
        self.descriptors.iter().filter(move |d| d.supports_language(language))
    }
}

fn langs(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

fn voices(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(lang, names)| (lang.to_string(), names.iter().map(|n| n.to_string()).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = ProviderCatalog::builtin();
        assert!(catalog.validate().is_ok());
        assert!(catalog.get("espeak").is_some());
        assert_eq!(catalog.position("naver_clova"), Some(0));
    }

    #[test]
    fn test_language_support() {
        let catalog = ProviderCatalog::builtin();
        let clova = catalog.get("naver_clova").unwrap();
        assert!(clova.supports_language("ko-KR"));
        assert!(!clova.supports_language("ru"));

        let openai = catalog.get("openai").unwrap();
        assert!(openai.supports_language("ru-RU"));
    }

    #[test]
    fn test_voices() {
        let catalog = ProviderCatalog::builtin();
        let google = catalog.get("google_cloud").unwrap();
        assert_eq!(google.default_voice("ko-KR"), "ko-KR-Wavenet-A");
        assert!(google.accepts_voice("ko", "ko-KR-Standard-A"));
        assert!(!google.accepts_voice("ko", "nara"));

        let espeak = catalog.get("espeak").unwrap();
        assert_eq!(espeak.default_voice("ko-KR"), "ko");
        assert!(espeak.accepts_voice("ko", "anything"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let builtin = ProviderCatalog::builtin();
        let espeak = builtin.get("espeak").unwrap().clone();
        assert!(ProviderCatalog::new(vec![espeak.clone(), espeak]).is_err());
    }

    #[test]
    fn test_upsert_replaces() {
        let mut catalog = ProviderCatalog::builtin();
        let mut espeak = catalog.get("espeak").unwrap().clone();
        espeak.rate_limit_per_minute = 1;
        catalog.upsert(espeak);
        assert_eq!(catalog.get("espeak").unwrap().rate_limit_per_minute, 1);
        assert_eq!(catalog.len(), 5);
    }
}
