//! Vowel/formant region boost

use crate::config::{EnhancementConfig, EnhancementLevel};
use crate::error::AudioError;
use crate::stft::{power_spectrum, Stft};

const VOWEL_LOW_HZ: f32 = 200.0;
const VOWEL_HIGH_HZ: f32 = 3000.0;

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Gain at `freq` from the configured Gaussian bands
pub fn band_gain(config: &EnhancementConfig, level: EnhancementLevel, freq: f32) -> f32 {
    let factor = level.factor();
    1.0 + config
        .bands
        .iter()
        .map(|band| {
            let peak = db_to_linear(band.gain_db * factor) - 1.0;
            let z = (freq - band.center_hz) / band.width_hz;
            peak * (-0.5 * z * z).exp()
        })
        .sum::<f32>()
}

/// Share of frame energy inside the F1/F2 region
pub fn vowel_ratio(power: &[f32], stft: &Stft, sample_rate: u32) -> f32 {
    let total: f32 = power.iter().sum();
    if total <= f32::EPSILON {
        return 0.0;
    }
    let vowel: f32 = power
        .iter()
        .enumerate()
        .filter(|(k, _)| {
            let f = stft.bin_frequency(*k, sample_rate);
            (VOWEL_LOW_HZ..=VOWEL_HIGH_HZ).contains(&f)
        })
        .map(|(_, p)| p)
        .sum();
    vowel / total
}

/// Boost formant bands, with an extra lift on vowel-dominant frames
pub fn boost_formants(
    stft: &Stft,
    samples: &[f32],
    sample_rate: u32,
    config: &EnhancementConfig,
    level: EnhancementLevel,
) -> Result<Vec<f32>, AudioError> {
    let mut frames = stft.analyze(samples);
    if frames.is_empty() {
        return Ok(samples.to_vec());
    }

    let vowel_lift = db_to_linear(config.vowel_boost_db * level.factor());
    let mut vowel_frames = 0usize;

    for frame in frames.iter_mut() {
        let dominant = vowel_ratio(&power_spectrum(frame), stft, sample_rate) >= config.vowel_ratio_threshold;
        if dominant {
            vowel_frames += 1;
        }
        stft.apply_gain(frame, sample_rate, |f| {
            let gain = band_gain(config, level, f);
            if dominant && (VOWEL_LOW_HZ..=VOWEL_HIGH_HZ).contains(&f) {
                gain * vowel_lift
            } else {
                gain
            }
        });
    }

    tracing::debug!(frames = frames.len(), vowel_frames, "Formant boost applied");
    let output = stft.synthesize(&frames, samples.len());
    if output.iter().any(|s| !s.is_finite()) {
        return Err(AudioError::stage("formant_boost", "non-finite output"));
    }
    Ok(output)
}
