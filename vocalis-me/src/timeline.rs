//! Expression, motion and breath scheduling across a clip's measured duration

use crate::config::AnimationConfig;
use crate::emotion::{EmotionAnalysis, Expression, Motion};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MID_VARIATION_MIN_SECS: f64 = 2.0;
const NEUTRAL_RETURN_MIN_SECS: f64 = 3.0;
const QUARTER_KEYFRAMES_MIN_SECS: f64 = 4.0;
const BREATH_MIN_SECS: f64 = 2.0;

const MID_FACTOR: f32 = 0.8;
const QUARTER_FACTOR: f32 = 0.9;
const THREE_QUARTER_FACTOR: f32 = 0.7;

/// One expression target at a point in time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    pub timestamp: f64,
    pub expression: Expression,
    pub intensity: f32,
}

/// One motion trigger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MotionCue {
    pub timestamp: f64,
    pub motion: Motion,
}

/// Planned non-lipsync animation for one clip, each list sorted by timestamp
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub duration: f64,
    pub expressions: Vec<Keyframe>,
    pub motions: Vec<MotionCue>,
    pub breaths: Vec<f64>,
}

/// Schedules keyframes from an emotion analysis
#[derive(Debug, Clone)]
pub struct TimelinePlanner {
    config: AnimationConfig,
}

impl TimelinePlanner {
    pub fn new(config: AnimationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    /// Plan expressions, motions and breath pulses for a clip of `duration` seconds
    pub fn plan(
        &self,
        text: &str,
        emotion: &EmotionAnalysis,
        duration: f64,
        intensity_base: f32,
        context: &[String],
    ) -> Timeline {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let expression = emotion.expression();
        let peak = (intensity_base * emotion.intensity).clamp(0.0, 1.0);

        let mut expressions = vec![Keyframe {
            timestamp: 0.0,
            expression,
            intensity: peak,
        }];

        if duration > MID_VARIATION_MIN_SECS && emotion.confidence > self.config.confidence_threshold {
            expressions.push(Keyframe {
                timestamp: duration * self.config.mid_variation_at,
                expression,
                intensity: peak * MID_FACTOR,
            });
        }

        if duration > QUARTER_KEYFRAMES_MIN_SECS {
            expressions.push(Keyframe {
                timestamp: duration * 0.25,
                expression,
                intensity: peak * QUARTER_FACTOR,
            });
            expressions.push(Keyframe {
                timestamp: duration * 0.75,
                expression,
                intensity: peak * THREE_QUARTER_FACTOR,
            });
        }

        if duration > NEUTRAL_RETURN_MIN_SECS {
            expressions.push(Keyframe {
                timestamp: (duration - self.config.neutral_lead_secs).max(0.0),
                expression: Expression::Neutral,
                intensity: intensity_base.clamp(0.0, 1.0),
            });
        }
        expressions.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut motions = Vec::new();
        if let Some(motion) = Motion::for_emotion(emotion.primary) {
            motions.push(MotionCue { timestamp: 0.0, motion });
        }
        for rule in &self.config.motion_rules {
            if rule.matches(text, context) {
                motions.push(MotionCue {
                    timestamp: duration * rule.at_fraction,
                    motion: rule.motion,
                });
            }
        }
        motions.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let breaths = self.breath_times(duration);

        debug!(
            duration,
            expression = expression.as_str(),
            keyframes = expressions.len(),
            motions = motions.len(),
            breaths = breaths.len(),
            "Timeline planned"
        );

        Timeline {
            duration,
            expressions,
            motions,
            breaths,
        }
    }

    /// Breath pulses every interval, none within the tail of the clip
    fn breath_times(&self, duration: f64) -> Vec<f64> {
        if duration <= BREATH_MIN_SECS {
            return Vec::new();
        }
        let interval = self.config.breath_interval_secs;
        let cutoff = duration - self.config.breath_tail_secs;
        (1..)
            .map(|n| n as f64 * interval)
            .take_while(|t| *t < cutoff)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionAnalyzer;
    use vocalis_core::Emotion;

    fn analysis(primary: Emotion, intensity: f32, confidence: f32) -> EmotionAnalysis {
        EmotionAnalysis {
            primary,
            intensity,
            confidence,
            scores: Default::default(),
        }
    }

    fn planner() -> TimelinePlanner {
        TimelinePlanner::new(AnimationConfig::default())
    }

    #[test]
    fn test_short_clip_has_single_keyframe() {
        let timeline = planner().plan("hi", &analysis(Emotion::Joy, 0.8, 0.9), 1.5, 1.0, &[]);
        assert_eq!(timeline.expressions.len(), 1);
        assert_eq!(timeline.expressions[0].timestamp, 0.0);
        assert_eq!(timeline.expressions[0].expression, Expression::Joy);
        assert!((timeline.expressions[0].intensity - 0.8).abs() < 1e-6);
        assert!(timeline.breaths.is_empty());
    }

    #[test]
    fn test_long_clip_keyframes() {
        let timeline = planner().plan("hi", &analysis(Emotion::Sadness, 1.0, 0.9), 6.0, 1.0, &[]);
        let times: Vec<f64> = timeline.expressions.iter().map(|k| k.timestamp).collect();
        let expected = [0.0, 1.5, 2.4, 4.5, 5.5];
        assert_eq!(times.len(), expected.len());
        for (t, e) in times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-9, "{} vs {}", t, e);
        }

        let intensities: Vec<f32> = timeline.expressions.iter().map(|k| k.intensity).collect();
        assert!((intensities[1] - 0.9).abs() < 1e-6);
        assert!((intensities[2] - 0.8).abs() < 1e-6);
        assert!((intensities[3] - 0.7).abs() < 1e-6);

        let last = timeline.expressions.last().unwrap();
        assert_eq!(last.expression, Expression::Neutral);
        assert!((last.timestamp - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_skips_mid_variation() {
        let timeline = planner().plan("hi", &analysis(Emotion::Calm, 0.6, 0.5), 2.5, 1.0, &[]);
        assert_eq!(timeline.expressions.len(), 1);
    }

    #[test]
    fn test_breath_schedule() {
        let planner = planner();
        assert_eq!(planner.breath_times(2.0), Vec::<f64>::new());
        assert_eq!(planner.breath_times(3.5), Vec::<f64>::new());
        assert_eq!(planner.breath_times(4.5), vec![3.0]);
        assert_eq!(planner.breath_times(10.0), vec![3.0, 6.0]);
    }

    #[test]
    fn test_context_motions() {
        let emotion = EmotionAnalyzer::new().analyze("오늘의 타로 카드를 뽑아볼게요", None);
        let timeline = planner().plan("오늘의 타로 카드를 뽑아볼게요", &emotion, 5.0, 1.0, &[]);
        let motions: Vec<Motion> = timeline.motions.iter().map(|m| m.motion).collect();
        assert_eq!(motions, vec![Motion::Gaze, Motion::CardReveal]);
        assert!((timeline.motions[1].timestamp - 1.0).abs() < 1e-9);

        let timeline = planner().plan("hello", &analysis(Emotion::Neutral, 0.5, 0.5), 5.0, 1.0, &["fortune".to_string()]);
        assert_eq!(timeline.motions.len(), 1);
        assert_eq!(timeline.motions[0].motion, Motion::Ponder);
        assert!((timeline.motions[0].timestamp - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_intensity_base_scales_keyframes() {
        let timeline = planner().plan("hi", &analysis(Emotion::Joy, 0.8, 1.0), 1.0, 0.5, &[]);
        assert!((timeline.expressions[0].intensity - 0.4).abs() < 1e-6);
    }
}
