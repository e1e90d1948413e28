//! Configuration for animation planning and the top-level engine

use crate::emotion::Motion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use vocalis_core::Error as CoreError;
use vocalis_sc::{AnalysisConfig, EnhancementConfig};
use vocalis_spk::{ProviderCatalog, ProviderDescriptor, SpeechConfig};

/// Animation timeline and streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Multiplier applied to every expression keyframe (0.0-1.0, default 1.0)
    pub intensity_base: f32,

    /// Position of the mid-clip variation keyframe as a fraction of duration
    pub mid_variation_at: f64,

    /// Emotion confidence required for the mid-clip variation
    pub confidence_threshold: f32,

    /// Seconds between breath pulses
    pub breath_interval_secs: f64,

    /// No breath pulse within this many seconds of the clip end
    pub breath_tail_secs: f64,

    pub breath_intensity: f32,

    /// Return-to-neutral keyframe is placed this long before the end
    pub neutral_lead_secs: f64,

    /// Upper bound on one pacing sleep in milliseconds
    pub pacing_interval_ms: u64,

    /// Concurrent synthesis-to-animation pipelines
    pub max_concurrent_sessions: usize,

    /// Buffer size of streaming command channels
    pub channel_buffer: usize,

    /// Keyword and context triggered motions
    pub motion_rules: Vec<MotionRule>,
}

/// Triggers `motion` at `at_fraction` of the clip when any keyword occurs
/// in the text or the request context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionRule {
    pub motion: Motion,
    pub keywords: Vec<String>,
    pub at_fraction: f64,
}

impl MotionRule {
    pub fn new(motion: Motion, keywords: &[&str], at_fraction: f64) -> Self {
        Self {
            motion,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            at_fraction,
        }
    }

    /// Whether the lowercased text or any context tag mentions a keyword
    pub fn matches(&self, text: &str, context: &[String]) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            text.contains(&keyword) || context.iter().any(|tag| tag.to_lowercase().contains(&keyword))
        })
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            intensity_base: 1.0,
            mid_variation_at: 0.4,
            confidence_threshold: 0.7,
            breath_interval_secs: 3.0,
            breath_tail_secs: 1.0,
            breath_intensity: 0.3,
            neutral_lead_secs: 0.5,
            pacing_interval_ms: 33,
            max_concurrent_sessions: 64,
            channel_buffer: 256,
            motion_rules: vec![
                MotionRule::new(Motion::CardReveal, &["tarot", "card", "카드", "타로"], 0.2),
                MotionRule::new(Motion::Ponder, &["운세", "fortune"], 0.3),
            ],
        }
    }
}

impl AnimationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.intensity_base) {
            return Err("intensity_base must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("confidence_threshold must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..1.0).contains(&self.mid_variation_at) {
            return Err("mid_variation_at must be in [0.0, 1.0)".to_string());
        }
        if !(self.breath_interval_secs.is_finite() && self.breath_interval_secs > 0.0) {
            return Err("breath_interval_secs must be positive".to_string());
        }
        if !(self.breath_tail_secs.is_finite() && self.breath_tail_secs >= 0.0) {
            return Err("breath_tail_secs cannot be negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.breath_intensity) {
            return Err("breath_intensity must be between 0.0 and 1.0".to_string());
        }
        if !(self.neutral_lead_secs.is_finite() && self.neutral_lead_secs >= 0.0) {
            return Err("neutral_lead_secs cannot be negative".to_string());
        }
        if self.pacing_interval_ms == 0 || self.pacing_interval_ms > 1000 {
            return Err("pacing_interval_ms must be between 1 and 1000".to_string());
        }
        if self.max_concurrent_sessions == 0 {
            return Err("max_concurrent_sessions must be at least 1".to_string());
        }
        if self.channel_buffer == 0 {
            return Err("channel_buffer must be at least 1".to_string());
        }
        for rule in &self.motion_rules {
            if rule.keywords.is_empty() {
                return Err(format!("motion rule {:?} has no keywords", rule.motion));
            }
            if !(0.0..=1.0).contains(&rule.at_fraction) {
                return Err(format!("motion rule {:?} at_fraction must be in [0.0, 1.0]", rule.motion));
            }
        }
        Ok(())
    }

    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }
}

/// Whole-workspace configuration, one section per crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocalisConfig {
    pub speech: SpeechConfig,
    /// Catalog additions and overrides, matched by provider id
    pub providers: Vec<ProviderDescriptor>,
    pub enhancement: EnhancementConfig,
    pub analysis: AnalysisConfig,
    pub animation: AnimationConfig,
}

impl VocalisConfig {
    /// Load from defaults, an optional TOML file and `VOCALIS__*` variables, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let config: VocalisConfig = vocalis_core::load_layered(path)?;
        config.validate().map_err(CoreError::Configuration)?;
        info!(
            providers = config.providers.len(),
            mode = ?config.speech.mode,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML document on top of defaults, without environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        let config: VocalisConfig = vocalis_core::config::from_toml_str(contents)?;
        config.validate().map_err(CoreError::Configuration)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.speech.validate().map_err(|e| format!("speech: {}", e))?;
        self.enhancement.validate().map_err(|e| format!("enhancement: {}", e))?;
        self.analysis.validate().map_err(|e| format!("analysis: {}", e))?;
        self.animation.validate().map_err(|e| format!("animation: {}", e))?;
        self.catalog().map(|_| ())
    }

    /// Built-in catalog with configured providers upserted
    pub fn catalog(&self) -> Result<ProviderCatalog, String> {
        let mut catalog = ProviderCatalog::builtin();
        for descriptor in &self.providers {
            catalog.upsert(descriptor.clone());
        }
        catalog.validate().map_err(|e| format!("providers: {}", e))?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VocalisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.animation.pacing_interval(), Duration::from_millis(33));
        assert_eq!(config.animation.breath_interval_secs, 3.0);
    }

    #[test]
    fn test_animation_bounds() {
        let mut config = AnimationConfig::default();
        config.intensity_base = 1.2;
        assert!(config.validate().is_err());

        let mut config = AnimationConfig::default();
        config.pacing_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AnimationConfig::default();
        config.motion_rules.push(MotionRule::new(Motion::Nod, &[], 0.5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_motion_rule_matching() {
        let rule = MotionRule::new(Motion::CardReveal, &["tarot", "카드"], 0.2);
        assert!(rule.matches("Let me draw a TAROT card", &[]));
        assert!(rule.matches("오늘의 카드를 뽑아볼게요", &[]));
        assert!(rule.matches("hello", &["tarot-reading".to_string()]));
        assert!(!rule.matches("hello", &[]));
    }

    #[test]
    fn test_toml_sections() {
        let config = VocalisConfig::from_toml_str(
            "[animation]\nbreath_interval_secs = 2.5\n\n[analysis]\nframe_rate = 25.0\n",
        )
        .unwrap();
        assert_eq!(config.animation.breath_interval_secs, 2.5);
        assert_eq!(config.analysis.frame_rate, 25.0);
        assert_eq!(config.animation.pacing_interval_ms, 33);
    }

    #[test]
    fn test_invalid_section_is_reported() {
        let err = VocalisConfig::from_toml_str("[animation]\nintensity_base = 3.0\n").unwrap_err();
        assert!(err.to_string().contains("animation"));
    }
}
