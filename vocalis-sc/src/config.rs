//! Configuration for audio enhancement and viseme analysis

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vocalis_core::types::primary_language;
use vocalis_core::VisemeCategory;

/// Enhancement strength
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementLevel {
    Light,
    Moderate,
    Strong,
    Maximum,
}

impl EnhancementLevel {
    /// Multiplier applied to configured band gains
    pub fn factor(&self) -> f32 {
        match self {
            EnhancementLevel::Light => 0.25,
            EnhancementLevel::Moderate => 0.5,
            EnhancementLevel::Strong => 0.75,
            EnhancementLevel::Maximum => 1.0,
        }
    }
}

/// Which stages run for a clip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementProfile {
    /// Every enabled stage at the configured level
    Full,
    /// No noise reduction, light formant boost, no compression
    Light,
    Off,
}

/// Gaussian spectral boost around a center frequency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormantBand {
    pub name: String,
    pub center_hz: f32,
    /// Width at one standard deviation either side
    pub width_hz: f32,
    /// Boost at `Maximum` level
    pub gain_db: f32,
}

impl FormantBand {
    pub fn new(name: &str, center_hz: f32, width_hz: f32, gain_db: f32) -> Self {
        Self {
            name: name.to_string(),
            center_hz,
            width_hz,
            gain_db,
        }
    }
}

/// Audio enhancement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Master switch; disabled means every profile behaves like `Off`
    pub enabled: bool,

    pub noise_reduction: bool,
    pub formant_boost: bool,
    pub loudness: bool,
    pub compression: bool,

    pub level: EnhancementLevel,

    /// STFT size for the spectral stages
    pub fft_size: usize,

    /// Noise over-subtraction factor
    pub over_subtraction: f32,

    /// Minimum spectral gain after subtraction
    pub spectral_floor: f32,

    /// Recursive smoothing of gains across frames (0 = none)
    pub gain_smoothing: f32,

    pub bands: Vec<FormantBand>,

    /// Share of energy in 200-3000 Hz marking a frame vowel-dominant
    pub vowel_ratio_threshold: f32,

    /// Extra boost for vowel-dominant frames at `Maximum` level
    pub vowel_boost_db: f32,

    /// Integrated loudness target (LUFS)
    pub target_lufs: f64,

    pub max_gain_db: f64,

    /// Soft limiter threshold (linear, 0-1)
    pub limiter_knee: f32,

    pub compression_threshold_db: f32,
    pub compression_ratio: f32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            noise_reduction: true,
            formant_boost: true,
            loudness: true,
            compression: false,
            level: EnhancementLevel::Moderate,
            fft_size: 1024,
            over_subtraction: 2.0,
            spectral_floor: 0.05,
            gain_smoothing: 0.6,
            bands: vec![
                FormantBand::new("low_vowel", 500.0, 250.0, 4.0),
                FormantBand::new("mid_vowel", 1500.0, 500.0, 3.0),
                FormantBand::new("high_vowel", 2700.0, 600.0, 2.0),
                FormantBand::new("consonant", 4500.0, 1200.0, 1.5),
            ],
            vowel_ratio_threshold: 0.6,
            vowel_boost_db: 2.0,
            target_lufs: -16.0,
            max_gain_db: 20.0,
            limiter_knee: 0.9,
            compression_threshold_db: -18.0,
            compression_ratio: 2.0,
        }
    }
}

impl EnhancementConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two() || !(256..=8192).contains(&self.fft_size) {
            return Err("FFT size must be a power of two between 256 and 8192".to_string());
        }
        if !(1.0..=10.0).contains(&self.over_subtraction) {
            return Err("Over-subtraction must be between 1.0 and 10.0".to_string());
        }
        if !(0.0..1.0).contains(&self.spectral_floor) {
            return Err("Spectral floor must be in [0.0, 1.0)".to_string());
        }
        if !(0.0..1.0).contains(&self.gain_smoothing) {
            return Err("Gain smoothing must be in [0.0, 1.0)".to_string());
        }
        for band in &self.bands {
            if band.center_hz <= 0.0 || band.width_hz <= 0.0 {
                return Err(format!("Band '{}' needs positive center and width", band.name));
            }
            if !(-24.0..=24.0).contains(&band.gain_db) {
                return Err(format!("Band '{}' gain must be within +/-24 dB", band.name));
            }
        }
        if !(0.0..=1.0).contains(&self.vowel_ratio_threshold) {
            return Err("Vowel ratio threshold must be in [0.0, 1.0]".to_string());
        }
        if !(-70.0..=0.0).contains(&self.target_lufs) {
            return Err("Target loudness must be between -70 and 0 LUFS".to_string());
        }
        if !(0.0..=40.0).contains(&self.max_gain_db) {
            return Err("Max gain must be between 0 and 40 dB".to_string());
        }
        if !(0.1..1.0).contains(&self.limiter_knee) {
            return Err("Limiter knee must be in [0.1, 1.0)".to_string());
        }
        if self.compression_ratio < 1.0 {
            return Err("Compression ratio must be at least 1.0".to_string());
        }
        Ok(())
    }
}

/// Inclusive F1/F2 ranges for one vowel, in Hz
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FormantRange {
    pub f1: (f64, f64),
    pub f2: (f64, f64),
}

impl FormantRange {
    pub const fn new(f1: (f64, f64), f2: (f64, f64)) -> Self {
        Self { f1, f2 }
    }
}

/// Formant ranges for the five vowel categories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormantTable {
    pub a: FormantRange,
    pub i: FormantRange,
    pub u: FormantRange,
    pub e: FormantRange,
    pub o: FormantRange,
}

impl Default for FormantTable {
    fn default() -> Self {
        Self {
            a: FormantRange::new((700.0, 1100.0), (1100.0, 1600.0)),
            i: FormantRange::new((250.0, 400.0), (2000.0, 3000.0)),
            u: FormantRange::new((250.0, 450.0), (700.0, 1200.0)),
            e: FormantRange::new((400.0, 650.0), (1700.0, 2300.0)),
            o: FormantRange::new((400.0, 650.0), (700.0, 1100.0)),
        }
    }
}

impl FormantTable {
    pub fn get(&self, category: VisemeCategory) -> Option<&FormantRange> {
        match category {
            VisemeCategory::A => Some(&self.a),
            VisemeCategory::I => Some(&self.i),
            VisemeCategory::U => Some(&self.u),
            VisemeCategory::E => Some(&self.e),
            VisemeCategory::O => Some(&self.o),
            VisemeCategory::Silence | VisemeCategory::Consonant => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VisemeCategory, &FormantRange)> {
        VisemeCategory::VOWELS
            .into_iter()
            .filter_map(move |c| self.get(c).map(|r| (c, r)))
    }

    pub fn validate(&self) -> Result<(), String> {
        for (category, range) in self.iter() {
            let ok = |(lo, hi): (f64, f64)| lo.is_finite() && hi.is_finite() && lo > 0.0 && lo < hi;
            if !ok(range.f1) || !ok(range.f2) {
                return Err(format!(
                    "Formant range for '{}' must have 0 < low < high",
                    category.as_str()
                ));
            }
        }
        Ok(())
    }
}

/// Viseme analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Output frames per second
    pub frame_rate: f64,

    /// Overlap of consecutive analysis windows (0.25 = window is 4/3 of the hop)
    pub window_overlap: f64,

    pub lpc_order: usize,
    pub pre_emphasis: f64,

    /// Minimum root magnitude for a pole to count as a formant
    pub min_pole_magnitude: f64,

    pub min_formant_hz: f64,
    pub max_formant_hz: f64,

    /// Frames quieter than this (relative to the loudest frame) are silence
    pub silence_threshold: f32,

    /// Best vowel scores under this become `Consonant`
    pub confidence_floor: f32,

    /// Centered moving-average width, in frames
    pub smoothing_window: usize,

    /// Overall scale applied to mouth parameters
    pub mouth_gain: f32,

    pub formants: FormantTable,

    /// Per-language formant tables keyed by primary subtag
    pub language_formants: HashMap<String, FormantTable>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            window_overlap: 0.25,
            lpc_order: 12,
            pre_emphasis: 0.97,
            min_pole_magnitude: 0.9,
            min_formant_hz: 50.0,
            max_formant_hz: 4000.0,
            silence_threshold: 0.05,
            confidence_floor: 0.3,
            smoothing_window: 3,
            mouth_gain: 1.0,
            formants: FormantTable::default(),
            language_formants: HashMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Formant table for a language, falling back to the default table
    pub fn formants_for(&self, language: Option<&str>) -> &FormantTable {
        language
            .and_then(|l| self.language_formants.get(&primary_language(l)))
            .unwrap_or(&self.formants)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.frame_rate.is_finite() || !(1.0..=240.0).contains(&self.frame_rate) {
            return Err("Frame rate must be between 1 and 240 fps".to_string());
        }
        if !(0.0..0.9).contains(&self.window_overlap) {
            return Err("Window overlap must be in [0.0, 0.9)".to_string());
        }
        if !(2..=48).contains(&self.lpc_order) {
            return Err("LPC order must be between 2 and 48".to_string());
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return Err("Pre-emphasis must be in [0.0, 1.0)".to_string());
        }
        if !(0.0..1.0).contains(&self.min_pole_magnitude) {
            return Err("Minimum pole magnitude must be in [0.0, 1.0)".to_string());
        }
        if self.min_formant_hz <= 0.0 || self.min_formant_hz >= self.max_formant_hz {
            return Err("Formant search range must satisfy 0 < min < max".to_string());
        }
        if !(0.0..1.0).contains(&self.silence_threshold) {
            return Err("Silence threshold must be in [0.0, 1.0)".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err("Confidence floor must be in [0.0, 1.0]".to_string());
        }
        if self.smoothing_window == 0 || self.smoothing_window > 15 {
            return Err("Smoothing window must be between 1 and 15 frames".to_string());
        }
        if !(0.0..=2.0).contains(&self.mouth_gain) {
            return Err("Mouth gain must be between 0.0 and 2.0".to_string());
        }
        self.formants.validate()?;
        for (language, table) in &self.language_formants {
            table
                .validate()
                .map_err(|e| format!("Formants for '{}': {}", language, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EnhancementConfig::default().validate().is_ok());
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_level_factors() {
        assert_eq!(EnhancementLevel::Light.factor(), 0.25);
        assert_eq!(EnhancementLevel::Maximum.factor(), 1.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut enhancement = EnhancementConfig::default();
        enhancement.fft_size = 1000;
        assert!(enhancement.validate().is_err());

        let mut analysis = AnalysisConfig::default();
        analysis.formants.a = FormantRange::new((1100.0, 700.0), (1100.0, 1600.0));
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn test_language_override() {
        let mut config = AnalysisConfig::default();
        let mut table = FormantTable::default();
        table.a = FormantRange::new((650.0, 1000.0), (1000.0, 1500.0));
        config.language_formants.insert("ja".to_string(), table.clone());

        assert_eq!(config.formants_for(Some("ja-JP")), &table);
        assert_eq!(config.formants_for(Some("ko")), &FormantTable::default());
        assert_eq!(config.formants_for(None), &FormantTable::default());
    }
}
