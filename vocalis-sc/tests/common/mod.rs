//! Deterministic vowel-like test signals

#![allow(dead_code)]

use bytes::Bytes;
use vocalis_sc::encode_wav;

/// Linear congruential noise in [-1, 1)
pub fn noise(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
        })
        .collect()
}

/// Two-pole resonator at `freq` with bandwidth `bandwidth`
pub fn resonate(input: &[f32], freq: f64, bandwidth: f64, sample_rate: u32) -> Vec<f32> {
    let r = (-std::f64::consts::PI * bandwidth / sample_rate as f64).exp();
    let theta = 2.0 * std::f64::consts::PI * freq / sample_rate as f64;
    let (a1, a2) = (2.0 * r * theta.cos(), -r * r);
    let (mut y1, mut y2) = (0.0f64, 0.0f64);
    input
        .iter()
        .map(|&x| {
            let y = x as f64 + a1 * y1 + a2 * y2;
            y2 = y1;
            y1 = y;
            y as f32
        })
        .collect()
}

fn normalize(samples: &mut [f32], peak: f32) {
    let max = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if max > 0.0 {
        for s in samples.iter_mut() {
            *s *= peak / max;
        }
    }
}

/// Noise-excited vowel with formants `f1`/`f2`, padded with `pad` seconds of silence
pub fn vowel(f1: f64, f2: f64, sample_rate: u32, seconds: f64, pad: f64) -> Vec<f32> {
    let voiced = (seconds * sample_rate as f64) as usize;
    let padding = (pad * sample_rate as f64) as usize;
    let excitation = noise(voiced, 7);
    let mut body = resonate(&resonate(&excitation, f1, 80.0, sample_rate), f2, 90.0, sample_rate);
    normalize(&mut body, 0.5);

    let mut out = vec![0.0; padding];
    out.extend(body);
    out.extend(std::iter::repeat(0.0).take(padding));
    out
}

pub fn wav(samples: &[f32], sample_rate: u32) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    encode_wav(&[samples.to_vec()], spec).unwrap()
}
