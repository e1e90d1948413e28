//! Fail-soft enhancement pipeline
//!
//! Stages run in order: noise reduction, formant boost, loudness normalization.
//! A failing stage logs and hands its input to the next stage unchanged.

pub mod formant;
pub mod loudness;
pub mod noise;

use crate::codec::{decode, encode_wav, measure_duration, DecodedAudio};
use crate::config::{EnhancementConfig, EnhancementLevel, EnhancementProfile};
use crate::error::AudioError;
use crate::stft::Stft;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vocalis_core::AudioFormat;

pub use loudness::LoudnessReport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NoiseReduction,
    FormantBoost,
    Loudness,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NoiseReduction => "noise_reduction",
            Stage::FormantBoost => "formant_boost",
            Stage::Loudness => "loudness",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum StageStatus {
    Applied,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
}

/// Per-clip record of what the pipeline did
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnhancementReport {
    pub profile: EnhancementProfile,
    pub stages: Vec<StageOutcome>,
    pub loudness: Option<LoudnessReport>,
}

impl EnhancementReport {
    fn new(profile: EnhancementProfile) -> Self {
        Self {
            profile,
            stages: Vec::with_capacity(3),
            loudness: None,
        }
    }

    fn skipped(profile: EnhancementProfile) -> Self {
        let mut report = Self::new(profile);
        for stage in [Stage::NoiseReduction, Stage::FormantBoost, Stage::Loudness] {
            report.push(stage, StageStatus::Skipped);
        }
        report
    }

    fn push(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push(StageOutcome { stage, status });
    }

    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|o| o.stage == stage).map(|o| &o.status)
    }

    pub fn any_applied(&self) -> bool {
        self.stages.iter().any(|o| o.status == StageStatus::Applied)
    }

    pub fn failures(&self) -> usize {
        self.stages
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Failed(_)))
            .count()
    }
}

/// Enhanced clip ready for delivery and analysis
#[derive(Debug, Clone)]
pub struct ProcessedClip {
    /// Delivered bytes: re-encoded WAV, or the original bytes for other containers
    pub audio: Bytes,
    pub format: AudioFormat,
    /// Enhanced mono samples, absent when the clip could not be decoded
    pub samples: Option<Vec<f32>>,
    pub sample_rate: u32,
    /// Duration measured from the decoded audio
    pub duration: Option<f64>,
    pub report: EnhancementReport,
}

#[derive(Debug, Clone, Copy)]
struct StagePlan {
    noise: bool,
    formant: Option<EnhancementLevel>,
    loudness: bool,
    compression: bool,
}

pub struct AudioEnhancer {
    config: EnhancementConfig,
    stft: Stft,
}

impl AudioEnhancer {
    pub fn new(config: EnhancementConfig) -> Result<Self, AudioError> {
        config.validate().map_err(AudioError::Config)?;
        let stft = Stft::new(config.fft_size)?;
        Ok(Self { config, stft })
    }

    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    fn plan(&self, profile: EnhancementProfile) -> StagePlan {
        let c = &self.config;
        match profile {
            _ if !c.enabled => StagePlan {
                noise: false,
                formant: None,
                loudness: false,
                compression: false,
            },
            EnhancementProfile::Off => StagePlan {
                noise: false,
                formant: None,
                loudness: false,
                compression: false,
            },
            EnhancementProfile::Full => StagePlan {
                noise: c.noise_reduction,
                formant: c.formant_boost.then_some(c.level),
                loudness: c.loudness,
                compression: c.compression,
            },
            EnhancementProfile::Light => StagePlan {
                noise: false,
                formant: c.formant_boost.then_some(EnhancementLevel::Light),
                loudness: c.loudness,
                compression: false,
            },
        }
    }

    /// Run the pipeline in place. Never fails; see the report for stage outcomes.
    pub fn enhance(&self, channels: &mut [Vec<f32>], sample_rate: u32, profile: EnhancementProfile) -> EnhancementReport {
        let plan = self.plan(profile);
        let mut report = EnhancementReport::new(profile);

        if sample_rate == 0 || channels.iter().all(|c| c.is_empty()) {
            return EnhancementReport::skipped(profile);
        }

        let status = if plan.noise {
            self.per_channel(channels, Stage::NoiseReduction, |samples| {
                noise::reduce_noise(&self.stft, samples, &self.config)
            })
        } else {
            StageStatus::Skipped
        };
        report.push(Stage::NoiseReduction, status);

        let status = match plan.formant {
            Some(level) => self.per_channel(channels, Stage::FormantBoost, |samples| {
                formant::boost_formants(&self.stft, samples, sample_rate, &self.config, level)
            }),
            None => StageStatus::Skipped,
        };
        report.push(Stage::FormantBoost, status);

        let status = if plan.loudness {
            let mut normalized = channels.to_vec();
            match loudness::normalize(&mut normalized, sample_rate, &self.config, plan.compression) {
                Ok(loudness) => {
                    channels.clone_from_slice(&normalized);
                    report.loudness = Some(loudness);
                    StageStatus::Applied
                }
                Err(e) => {
                    warn!(stage = Stage::Loudness.as_str(), error = %e, "Enhancement stage failed, passing input through");
                    StageStatus::Failed(e.to_string())
                }
            }
        } else {
            StageStatus::Skipped
        };
        report.push(Stage::Loudness, status);

        debug!(profile = ?profile, stages = ?report.stages, "Enhancement finished");
        report
    }

    fn per_channel<F>(&self, channels: &mut [Vec<f32>], stage: Stage, run: F) -> StageStatus
    where
        F: Fn(&[f32]) -> Result<Vec<f32>, AudioError>,
    {
        let mut outputs = Vec::with_capacity(channels.len());
        for channel in channels.iter() {
            match run(channel) {
                Ok(out) if out.len() == channel.len() => outputs.push(out),
                Ok(out) => {
                    let e = AudioError::stage(
                        stage.as_str(),
                        format!("length changed from {} to {}", channel.len(), out.len()),
                    );
                    warn!(stage = stage.as_str(), error = %e, "Enhancement stage failed, passing input through");
                    return StageStatus::Failed(e.to_string());
                }
                Err(e) => {
                    warn!(stage = stage.as_str(), error = %e, "Enhancement stage failed, passing input through");
                    return StageStatus::Failed(e.to_string());
                }
            }
        }
        for (channel, out) in channels.iter_mut().zip(outputs) {
            *channel = out;
        }
        StageStatus::Applied
    }

    /// Decode, enhance, re-encode (WAV only) and measure a synthesized clip.
    ///
    /// Undecodable input comes back unchanged with no samples and no measured duration.
    pub fn process_clip(&self, audio: &Bytes, format: AudioFormat, profile: EnhancementProfile) -> ProcessedClip {
        let decoded = match decode(audio, format) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(format = %format.extension(), error = %e, "Could not decode audio, skipping enhancement");
                return ProcessedClip {
                    audio: audio.clone(),
                    format,
                    samples: None,
                    sample_rate: 0,
                    duration: None,
                    report: EnhancementReport::skipped(profile),
                };
            }
        };

        let DecodedAudio {
            mut channels,
            sample_rate,
            wav_spec,
            ..
        } = decoded;
        let report = self.enhance(&mut channels, sample_rate, profile);

        let delivered = match (format, wav_spec) {
            (AudioFormat::Wav, Some(spec)) if report.any_applied() => match encode_wav(&channels, spec) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Could not re-encode enhanced audio, delivering original");
                    audio.clone()
                }
            },
            _ => audio.clone(),
        };

        let enhanced = DecodedAudio {
            channels,
            sample_rate,
            format,
            wav_spec,
        };
        let decoded_duration = (enhanced.frames() > 0).then(|| enhanced.duration());
        let duration = match format {
            AudioFormat::Wav => match measure_duration(&delivered, format) {
                Ok(d) if d > 0.0 => Some(d),
                Ok(_) => decoded_duration,
                Err(e) => {
                    warn!(error = %e, "Duration measurement failed");
                    decoded_duration
                }
            },
            AudioFormat::Mp3 | AudioFormat::Ogg => decoded_duration,
        };

        ProcessedClip {
            audio: delivered,
            format,
            samples: Some(enhanced.mono()),
            sample_rate,
            duration,
            report,
        }
    }
}
