//! Per-clip viseme analysis

use super::classifier::{classify, mouth_params};
use super::lpc::{estimate_formants, LpcSettings};
use crate::codec::decode;
use crate::config::{AnalysisConfig, FormantTable};
use crate::error::AudioError;
use bytes::Bytes;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner, Length};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use vocalis_core::{AudioFormat, MouthParams, VisemeCategory, VisemeFrame};

const F1_BAND_HZ: (f64, f64) = (200.0, 1000.0);
const F2_BAND_HZ: (f64, f64) = (800.0, 3000.0);

/// Progress of one clip through the analyzer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerState {
    Idle,
    Framing,
    Classifying,
    Smoothing,
    Done,
}

/// How a frame's formants were obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormantMethod {
    Lpc,
    FftPeaks,
    /// Below the silence threshold, formants not needed
    Quiet,
    /// Neither method produced formants; a silence frame was substituted
    Failed,
}

/// Result of analyzing one clip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisemeAnalysis {
    pub frames: Vec<VisemeFrame>,
    pub state: AnalyzerState,
    pub frame_rate: f64,
    /// Clip duration the frames were cut from, in seconds
    pub duration: f64,
    pub lpc_frames: usize,
    pub fallback_frames: usize,
    pub silence_frames: usize,
    pub failed_frames: usize,
}

impl VisemeAnalysis {
    fn empty(frame_rate: f64, duration: f64) -> Self {
        Self {
            frames: Vec::new(),
            state: AnalyzerState::Done,
            frame_rate,
            duration,
            lpc_frames: 0,
            fallback_frames: 0,
            silence_frames: 0,
            failed_frames: 0,
        }
    }

    /// Timestamp of the last frame (0.0 for an empty analysis)
    pub fn span(&self) -> f64 {
        self.frames.last().map(|f| f.timestamp).unwrap_or(0.0)
    }
}

struct FrameOutcome {
    category: VisemeCategory,
    confidence: f32,
    intensity: f32,
    method: FormantMethod,
}

struct ClipRun {
    state: AnalyzerState,
}

impl ClipRun {
    fn advance(&mut self, next: AnalyzerState) {
        trace!(from = ?self.state, to = ?next, "Viseme analyzer state");
        self.state = next;
    }
}

/// Frames a clip at a fixed rate and classifies each frame into a viseme
pub struct VisemeAnalyzer {
    config: AnalysisConfig,
}

impl VisemeAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Hop and window length in samples for a sample rate
    pub fn frame_geometry(&self, sample_rate: u32) -> (usize, usize) {
        let hop = (sample_rate as f64 / self.config.frame_rate).round().max(1.0) as usize;
        let window = (hop as f64 / (1.0 - self.config.window_overlap)).round() as usize;
        (hop, window.max(hop))
    }

    fn lpc_settings(&self) -> LpcSettings {
        LpcSettings {
            order: self.config.lpc_order,
            pre_emphasis: self.config.pre_emphasis,
            min_pole_magnitude: self.config.min_pole_magnitude,
            min_hz: self.config.min_formant_hz,
            max_hz: self.config.max_formant_hz,
        }
    }

    /// Analyze mono samples. Never fails: frames that cannot be classified become silence.
    pub fn analyze(&self, samples: &[f32], sample_rate: u32, language: Option<&str>) -> VisemeAnalysis {
        let mut run = ClipRun {
            state: AnalyzerState::Idle,
        };
        if sample_rate == 0 || samples.is_empty() {
            return VisemeAnalysis::empty(self.config.frame_rate, 0.0);
        }
        let duration = samples.len() as f64 / sample_rate as f64;

        run.advance(AnalyzerState::Framing);
        let (hop, window) = self.frame_geometry(sample_rate);
        let count = samples.len().div_ceil(hop);
        let bounds: Vec<(usize, usize)> = (0..count)
            .map(|i| {
                let start = i * hop;
                (start, (start + window).min(samples.len()))
            })
            .collect();
        let rms: Vec<f32> = bounds.iter().map(|&(s, e)| frame_rms(&samples[s..e])).collect();
        let loudest = rms.iter().copied().fold(0.0f32, f32::max);

        run.advance(AnalyzerState::Classifying);
        let table = self.config.formants_for(language);
        let settings = self.lpc_settings();
        let fft_size = window.next_power_of_two();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(fft_size);

        let outcomes: Vec<FrameOutcome> = bounds
            .par_iter()
            .zip(rms.par_iter())
            .map(|(&(start, end), &level)| {
                let intensity = if loudest > 1e-6 { level / loudest } else { 0.0 };
                self.classify_frame(&samples[start..end], intensity, sample_rate, table, &settings, &fft)
            })
            .collect();

        let mut analysis = VisemeAnalysis::empty(self.config.frame_rate, duration);
        let mut frames = Vec::with_capacity(count);
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome.method {
                FormantMethod::Lpc => analysis.lpc_frames += 1,
                FormantMethod::FftPeaks => analysis.fallback_frames += 1,
                FormantMethod::Quiet => analysis.silence_frames += 1,
                FormantMethod::Failed => analysis.failed_frames += 1,
            }
            let timestamp = ((i * hop) as f64 / sample_rate as f64).min(duration);
            frames.push(VisemeFrame {
                timestamp,
                category: outcome.category,
                intensity: outcome.intensity,
                params: mouth_params(outcome.category, outcome.intensity, self.config.mouth_gain),
                confidence: outcome.confidence,
            });
        }

        run.advance(AnalyzerState::Smoothing);
        smooth_params(&mut frames, self.config.smoothing_window);

        run.advance(AnalyzerState::Done);
        analysis.frames = frames;
        analysis.state = run.state;

        if analysis.failed_frames > 0 {
            warn!(
                failed = analysis.failed_frames,
                total = count,
                "Some frames had no formant estimate and were replaced with silence"
            );
        }
        debug!(
            frames = count,
            lpc = analysis.lpc_frames,
            fft_fallback = analysis.fallback_frames,
            silence = analysis.silence_frames,
            duration,
            "Viseme analysis finished"
        );
        analysis
    }

    /// Decode a clip and analyze its mono mix
    pub fn analyze_clip(
        &self,
        audio: &Bytes,
        format: AudioFormat,
        language: Option<&str>,
    ) -> Result<VisemeAnalysis, AudioError> {
        let decoded = decode(audio, format)?;
        Ok(self.analyze(&decoded.mono(), decoded.sample_rate, language))
    }

    fn classify_frame(
        &self,
        frame: &[f32],
        intensity: f32,
        sample_rate: u32,
        table: &FormantTable,
        settings: &LpcSettings,
        fft: &Arc<dyn Fft<f64>>,
    ) -> FrameOutcome {
        if intensity < self.config.silence_threshold {
            return FrameOutcome {
                category: VisemeCategory::Silence,
                confidence: 1.0,
                intensity,
                method: FormantMethod::Quiet,
            };
        }

        let formants = match estimate_formants(frame, sample_rate, settings) {
            Some(f) => Some((f, FormantMethod::Lpc)),
            None => fft_peak_formants(frame, sample_rate, fft).map(|f| (f, FormantMethod::FftPeaks)),
        };

        match formants {
            Some(((f1, f2), method)) => {
                let (category, confidence) = classify(f1, f2, table, self.config.confidence_floor);
                FrameOutcome {
                    category,
                    confidence,
                    intensity,
                    method,
                }
            }
            None => FrameOutcome {
                category: VisemeCategory::Silence,
                confidence: 0.0,
                intensity,
                method: FormantMethod::Failed,
            },
        }
    }
}

fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (energy / frame.len() as f64).sqrt() as f32;
    if rms.is_finite() {
        rms
    } else {
        0.0
    }
}

/// Dominant magnitude peaks in the F1 and F2 bands
fn fft_peak_formants(frame: &[f32], sample_rate: u32, fft: &Arc<dyn Fft<f64>>) -> Option<(f64, f64)> {
    let size = fft.len();
    if frame.len() < 2 || frame.len() > size {
        return None;
    }
    let n = frame.len();
    let mut buffer: Vec<Complex<f64>> = frame
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            Complex::new(s as f64 * w, 0.0)
        })
        .collect();
    buffer.resize(size, Complex::new(0.0, 0.0));
    fft.process(&mut buffer);

    let bin_hz = sample_rate as f64 / size as f64;
    let peak_in = |lo: f64, hi: f64| -> Option<(f64, f64)> {
        let first = (lo / bin_hz).ceil() as usize;
        let last = ((hi / bin_hz).floor() as usize).min(size / 2);
        (first..=last)
            .map(|k| (k as f64 * bin_hz, buffer[k].norm()))
            .filter(|(_, m)| m.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    };

    let (f1, m1) = peak_in(F1_BAND_HZ.0, F1_BAND_HZ.1)?;
    let (f2, m2) = peak_in(F2_BAND_HZ.0.max(f1 + bin_hz), F2_BAND_HZ.1)?;
    (m1 > 1e-9 && m2 > 1e-9).then_some((f1, f2))
}

/// Centered moving average over mouth parameters; edge frames are left as-is
fn smooth_params(frames: &mut [VisemeFrame], window: usize) {
    let half = window / 2;
    if half == 0 || frames.len() <= 2 * half {
        return;
    }
    let original: Vec<MouthParams> = frames.iter().map(|f| f.params).collect();
    let width = (2 * half + 1) as f32;
    for i in half..frames.len() - half {
        let slice = &original[i - half..=i + half];
        frames[i].params = MouthParams::new(
            slice.iter().map(|p| p.open_y).sum::<f32>() / width,
            slice.iter().map(|p| p.open_x).sum::<f32>() / width,
            slice.iter().map(|p| p.form).sum::<f32>() / width,
        );
    }
}
