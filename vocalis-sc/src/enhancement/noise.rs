//! Spectral-subtraction noise reduction

use crate::config::EnhancementConfig;
use crate::error::AudioError;
use crate::stft::{power_spectrum, Stft};
use tracing::debug;

/// Bottom-decile noise floor must sit this far under the median frame energy
/// before anything is subtracted
const MIN_SIGNAL_TO_FLOOR: f32 = 4.0;

/// Subtract a noise floor estimated from the quietest frames
pub fn reduce_noise(
    stft: &Stft,
    samples: &[f32],
    config: &EnhancementConfig,
) -> Result<Vec<f32>, AudioError> {
    let mut frames = stft.analyze(samples);
    if frames.len() < 2 {
        return Ok(samples.to_vec());
    }

    let powers: Vec<Vec<f32>> = frames.iter().map(|f| power_spectrum(f)).collect();
    let mut energies: Vec<(usize, f32)> = powers
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.iter().sum::<f32>()))
        .collect();
    if energies.iter().any(|(_, e)| !e.is_finite()) {
        return Err(AudioError::stage("noise_reduction", "non-finite spectrum"));
    }
    energies.sort_by(|a, b| a.1.total_cmp(&b.1));

    let decile = (energies.len() / 10).max(1);
    let floor_energy = energies[..decile].iter().map(|(_, e)| e).sum::<f32>() / decile as f32;
    let median_energy = energies[energies.len() / 2].1;
    if median_energy <= 0.0 || floor_energy * MIN_SIGNAL_TO_FLOOR > median_energy {
        debug!("No distinct noise floor, skipping subtraction");
        return Ok(samples.to_vec());
    }

    let bins = powers[0].len();
    let mut noise = vec![0.0f32; bins];
    for (idx, _) in &energies[..decile] {
        for (n, p) in noise.iter_mut().zip(&powers[*idx]) {
            *n += p / decile as f32;
        }
    }

    let floor = config.spectral_floor;
    let alpha = config.over_subtraction;
    let smoothing = config.gain_smoothing;
    let size = stft.size();
    let mut previous: Option<Vec<f32>> = None;

    for (frame, power) in frames.iter_mut().zip(&powers) {
        let raw: Vec<f32> = power
            .iter()
            .zip(&noise)
            .map(|(&p, &n)| {
                if p <= f32::EPSILON {
                    floor.sqrt()
                } else {
                    (1.0 - alpha * n / p).max(floor).sqrt()
                }
            })
            .collect();

        // Wiener-style recursive smoothing of the gain track
        let gains = match previous {
            Some(prev) => raw
                .iter()
                .zip(&prev)
                .map(|(g, p)| smoothing * p + (1.0 - smoothing) * g)
                .collect(),
            None => raw,
        };

        for (k, bin) in frame.iter_mut().enumerate() {
            let mirrored = if k <= size / 2 { k } else { size - k };
            *bin *= gains[mirrored];
        }
        previous = Some(gains);
    }

    let output = stft.synthesize(&frames, samples.len());
    if output.iter().any(|s| !s.is_finite()) {
        return Err(AudioError::stage("noise_reduction", "non-finite output"));
    }
    Ok(output)
}
