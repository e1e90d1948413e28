//! Short-time Fourier transform with weighted overlap-add resynthesis

use crate::error::AudioError;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Hann-windowed STFT with 50 % hop.
///
/// Frames start half a window before the first sample so every sample is
/// covered by a non-zero window weight. Resynthesis divides by the summed
/// squared window, so an unmodified spectrum reconstructs the input exactly
/// and output length always equals input length.
pub struct Stft {
    size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(size: usize) -> Result<Self, AudioError> {
        if size < 4 || !size.is_power_of_two() {
            return Err(AudioError::Config(format!(
                "STFT size must be a power of two >= 4, got {}",
                size
            )));
        }
        let mut planner = FftPlanner::new();
        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos())
            .collect();
        Ok(Self {
            size,
            hop: size / 2,
            window,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Center frequency of bin `k` (mirrored bins map to the same frequency)
    pub fn bin_frequency(&self, k: usize, sample_rate: u32) -> f32 {
        let k = k.min(self.size - k.min(self.size));
        k as f32 * sample_rate as f32 / self.size as f32
    }

    fn frame_starts(&self, len: usize) -> impl Iterator<Item = isize> {
        let hop = self.hop as isize;
        (0..)
            .map(move |m| -hop + m * hop)
            .take_while(move |&start| start < len as isize)
    }

    /// Windowed spectra, one per frame
    pub fn analyze(&self, input: &[f32]) -> Vec<Vec<Complex<f32>>> {
        if input.is_empty() {
            return Vec::new();
        }
        let mut scratch = vec![Complex::new(0.0, 0.0); self.forward.get_inplace_scratch_len()];
        self.frame_starts(input.len())
            .map(|start| {
                let mut frame: Vec<Complex<f32>> = (0..self.size)
                    .map(|i| {
                        let idx = start + i as isize;
                        let sample = if idx >= 0 && (idx as usize) < input.len() {
                            input[idx as usize]
                        } else {
                            0.0
                        };
                        Complex::new(sample * self.window[i], 0.0)
                    })
                    .collect();
                self.forward.process_with_scratch(&mut frame, &mut scratch);
                frame
            })
            .collect()
    }

    /// Overlap-add resynthesis of `len` samples from (possibly modified) spectra
    pub fn synthesize(&self, frames: &[Vec<Complex<f32>>], len: usize) -> Vec<f32> {
        let mut output = vec![0.0f32; len];
        let mut norm = vec![0.0f32; len];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.inverse.get_inplace_scratch_len()];
        let scale = 1.0 / self.size as f32;

        for (frame, start) in frames.iter().zip(self.frame_starts(len)) {
            let mut buffer = frame.clone();
            buffer.resize(self.size, Complex::new(0.0, 0.0));
            self.inverse.process_with_scratch(&mut buffer, &mut scratch);
            for (i, value) in buffer.iter().enumerate() {
                let idx = start + i as isize;
                if idx < 0 || idx as usize >= len {
                    continue;
                }
                let w = self.window[i];
                output[idx as usize] += value.re * scale * w;
                norm[idx as usize] += w * w;
            }
        }

        for (sample, weight) in output.iter_mut().zip(&norm) {
            if *weight > 1e-8 {
                *sample /= weight;
            } else {
                *sample = 0.0;
            }
        }
        output
    }

    /// Scale each bin by `gain(frequency_hz)`, keeping the spectrum Hermitian
    pub fn apply_gain<F>(&self, frame: &mut [Complex<f32>], sample_rate: u32, gain: F)
    where
        F: Fn(f32) -> f32,
    {
        for (k, bin) in frame.iter_mut().enumerate() {
            *bin *= gain(self.bin_frequency(k, sample_rate));
        }
    }
}

/// Power per bin for bins 0..=size/2
pub fn power_spectrum(frame: &[Complex<f32>]) -> Vec<f32> {
    frame[..frame.len() / 2 + 1].iter().map(|c| c.norm_sqr()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_reconstruction() {
        let stft = Stft::new(256).unwrap();
        let input: Vec<f32> = (0..1000)
            .map(|i| ((i * 37 % 101) as f32 / 50.0 - 1.0) * 0.8)
            .collect();
        let frames = stft.analyze(&input);
        let output = stft.synthesize(&frames, input.len());
        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_short_input() {
        let stft = Stft::new(1024).unwrap();
        let input = vec![0.1, -0.2, 0.3];
        let output = stft.synthesize(&stft.analyze(&input), input.len());
        assert_eq!(output.len(), 3);
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-5);
        }
        assert!(stft.analyze(&[]).is_empty());
    }

    #[test]
    fn test_bin_frequency_is_mirrored() {
        let stft = Stft::new(1024).unwrap();
        assert_eq!(stft.bin_frequency(0, 16_000), 0.0);
        assert_eq!(stft.bin_frequency(64, 16_000), 1000.0);
        assert_eq!(stft.bin_frequency(1024 - 64, 16_000), 1000.0);
        assert_eq!(stft.bin_frequency(512, 16_000), 8000.0);
    }

    #[test]
    fn test_rejects_bad_size() {
        assert!(Stft::new(1000).is_err());
    }
}
