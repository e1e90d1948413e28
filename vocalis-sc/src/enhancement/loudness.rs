//! Integrated loudness (ITU-R BS.1770) normalization with soft limiting

use crate::config::EnhancementConfig;
use crate::error::AudioError;
use serde::{Deserialize, Serialize};

const BLOCK_SECONDS: f64 = 0.4;
const STEP_SECONDS: f64 = 0.1;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_DB: f64 = -10.0;

/// Direct-form biquad, coefficients normalized by a0
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    fn process(&self, input: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        input
            .iter()
            .map(|&x| {
                let y = self.b[0] * x + self.b[1] * x1 + self.b[2] * x2 - self.a[0] * y1 - self.a[1] * y2;
                x2 = x1;
                x1 = x;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }
}

/// Two-stage K-weighting filter designed for `sample_rate`
fn k_weighting(sample_rate: u32) -> [Biquad; 2] {
    let fs = sample_rate as f64;

    // Stage 1: high shelf modelling the head
    let gain_db = 3.999_843_853_973_347;
    let q = 0.707_175_236_955_419_6;
    let fc = 1_681.974_450_955_533;
    let a = 10f64.powf(gain_db / 40.0);
    let w0 = 2.0 * std::f64::consts::PI * fc / fs;
    let alpha = w0.sin() / (2.0 * q);
    let cos = w0.cos();
    let sqrt_a = a.sqrt();
    let a0 = (a + 1.0) - (a - 1.0) * cos + 2.0 * sqrt_a * alpha;
    let shelf = Biquad {
        b: [
            a * ((a + 1.0) + (a - 1.0) * cos + 2.0 * sqrt_a * alpha) / a0,
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos) / a0,
            a * ((a + 1.0) + (a - 1.0) * cos - 2.0 * sqrt_a * alpha) / a0,
        ],
        a: [
            2.0 * ((a - 1.0) - (a + 1.0) * cos) / a0,
            ((a + 1.0) - (a - 1.0) * cos - 2.0 * sqrt_a * alpha) / a0,
        ],
    };

    // Stage 2: RLB high pass
    let q = 0.500_327_037_323_877_3;
    let fc = 38.135_470_876_024_44;
    let w0 = 2.0 * std::f64::consts::PI * fc / fs;
    let alpha = w0.sin() / (2.0 * q);
    let cos = w0.cos();
    let a0 = 1.0 + alpha;
    let high_pass = Biquad {
        b: [(1.0 + cos) / 2.0 / a0, -(1.0 + cos) / a0, (1.0 + cos) / 2.0 / a0],
        a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
    };

    [shelf, high_pass]
}

fn block_loudness(mean_square: f64) -> f64 {
    -0.691 + 10.0 * mean_square.log10()
}

/// Gated integrated loudness in LUFS; `None` for silence or empty input
pub fn integrated_loudness(channels: &[Vec<f32>], sample_rate: u32) -> Option<f64> {
    let len = channels.first().map(Vec::len)?;
    if len == 0 || sample_rate == 0 {
        return None;
    }

    let [shelf, high_pass] = k_weighting(sample_rate);
    let weighted: Vec<Vec<f64>> = channels
        .iter()
        .map(|c| {
            let input: Vec<f64> = c.iter().map(|&s| s as f64).collect();
            high_pass.process(&shelf.process(&input))
        })
        .collect();

    let block = ((BLOCK_SECONDS * sample_rate as f64) as usize).clamp(1, len);
    let step = ((STEP_SECONDS * sample_rate as f64) as usize).max(1);

    let mut blocks = Vec::new();
    let mut start = 0;
    while start + block <= len {
        let z: f64 = weighted
            .iter()
            .map(|c| c[start..start + block].iter().map(|s| s * s).sum::<f64>() / block as f64)
            .sum();
        blocks.push(z);
        start += step;
    }

    let above_absolute: Vec<f64> = blocks
        .into_iter()
        .filter(|&z| z > 0.0 && block_loudness(z) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return None;
    }

    let relative_gate =
        block_loudness(above_absolute.iter().sum::<f64>() / above_absolute.len() as f64) + RELATIVE_GATE_DB;
    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&z| block_loudness(z) > relative_gate)
        .collect();
    if gated.is_empty() {
        return None;
    }

    Some(block_loudness(gated.iter().sum::<f64>() / gated.len() as f64))
}

/// tanh soft limiter above `knee`; the output magnitude never exceeds 1.0
pub fn soft_limit(sample: f32, knee: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= knee {
        return sample;
    }
    let headroom = 1.0 - knee;
    let limited = knee + headroom * ((magnitude - knee) / headroom).tanh();
    limited.copysign(sample)
}

/// Feed-forward RMS compressor with a one-pole envelope
pub fn compress(samples: &mut [f32], sample_rate: u32, threshold_db: f32, ratio: f32) {
    if ratio <= 1.0 || samples.is_empty() {
        return;
    }
    let coefficient = |seconds: f32| (-1.0 / (seconds * sample_rate as f32)).exp();
    let attack = coefficient(0.01);
    let release = coefficient(0.1);
    let mut envelope = 0.0f32;

    for sample in samples.iter_mut() {
        let power = *sample * *sample;
        let coeff = if power > envelope { attack } else { release };
        envelope = coeff * envelope + (1.0 - coeff) * power;
        let level_db = 10.0 * envelope.max(1e-12).log10();
        let over = level_db - threshold_db;
        if over > 0.0 {
            let reduction_db = over * (1.0 - 1.0 / ratio);
            *sample *= 10f32.powf(-reduction_db / 20.0);
        }
    }
}

/// What the loudness stage did
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct LoudnessReport {
    pub input_lufs: Option<f64>,
    pub gain_db: f64,
}

/// Normalize to the target loudness, then compress (optionally) and soft-limit
pub fn normalize(
    channels: &mut [Vec<f32>],
    sample_rate: u32,
    config: &EnhancementConfig,
    compression: bool,
) -> Result<LoudnessReport, AudioError> {
    if channels.iter().flatten().any(|s| !s.is_finite()) {
        return Err(AudioError::stage("loudness", "non-finite input"));
    }
    let input_lufs = integrated_loudness(channels, sample_rate);
    let gain_db = match input_lufs {
        Some(lufs) if lufs.is_finite() => (config.target_lufs - lufs).min(config.max_gain_db),
        Some(_) => return Err(AudioError::stage("loudness", "non-finite loudness")),
        None => 0.0,
    };
    let gain = 10f64.powf(gain_db / 20.0) as f32;

    for channel in channels.iter_mut() {
        for sample in channel.iter_mut() {
            *sample *= gain;
        }
        if compression {
            compress(channel, sample_rate, config.compression_threshold_db, config.compression_ratio);
        }
        for sample in channel.iter_mut() {
            *sample = soft_limit(*sample, config.limiter_knee);
        }
    }

    Ok(LoudnessReport { input_lufs, gain_db })
}
