//! Animation commands and the merged, timestamp-ordered command list

use crate::emotion::{Expression, Motion};
use crate::timeline::Timeline;
use serde::{Deserialize, Serialize};
use vocalis_core::{CapabilityFlags, MouthParams, VisemeCategory, VisemeFrame};

/// Command payload, tagged by `type` on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    ExpressionChange {
        expression: Expression,
        intensity: f32,
    },
    MotionTrigger {
        motion: Motion,
    },
    LipsyncFrame {
        category: VisemeCategory,
        intensity: f32,
        params: MouthParams,
        confidence: f32,
    },
    BreathPulse {
        intensity: f32,
    },
}

impl CommandKind {
    /// Renderer priority for commands sharing a timestamp; higher wins
    pub fn priority(&self) -> u8 {
        match self {
            CommandKind::LipsyncFrame { .. } => 3,
            CommandKind::ExpressionChange { .. } => 2,
            CommandKind::MotionTrigger { .. } => 1,
            CommandKind::BreathPulse { .. } => 0,
        }
    }

    pub fn is_lipsync(&self) -> bool {
        matches!(self, CommandKind::LipsyncFrame { .. })
    }
}

/// One timestamped instruction for the avatar renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationCommand {
    /// Seconds from clip start
    pub timestamp: f64,
    pub priority: u8,
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl AnimationCommand {
    pub fn new(timestamp: f64, kind: CommandKind) -> Self {
        Self {
            timestamp,
            priority: kind.priority(),
            kind,
        }
    }

    pub fn lipsync(frame: &VisemeFrame) -> Self {
        Self::new(
            frame.timestamp,
            CommandKind::LipsyncFrame {
                category: frame.category,
                intensity: frame.intensity,
                params: frame.params,
                confidence: frame.confidence,
            },
        )
    }
}

/// Stable sort by timestamp, then priority descending
pub fn sort_commands(commands: &mut [AnimationCommand]) {
    commands.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then_with(|| b.priority.cmp(&a.priority))
    });
}

/// Merge viseme frames and a planned timeline into one ordered list.
///
/// Capability flags gate each family: no lip-sync drops viseme frames, no
/// expressions drops keyframes, no motions drops motion triggers and breath
/// pulses. Timestamps are clamped into the clip and duplicate lip-sync
/// timestamps keep only the first frame.
pub fn merge(
    timeline: &Timeline,
    visemes: &[VisemeFrame],
    capabilities: CapabilityFlags,
    breath_intensity: f32,
) -> Vec<AnimationCommand> {
    let duration = timeline.duration;
    let clamp = |t: f64| if t.is_finite() { t.clamp(0.0, duration) } else { 0.0 };

    let mut commands = Vec::with_capacity(
        visemes.len() + timeline.expressions.len() + timeline.motions.len() + timeline.breaths.len(),
    );

    if capabilities.lip_sync {
        let mut last: Option<f64> = None;
        for frame in visemes {
            let timestamp = clamp(frame.timestamp);
            if last == Some(timestamp) {
                continue;
            }
            last = Some(timestamp);
            let mut command = AnimationCommand::lipsync(frame);
            command.timestamp = timestamp;
            commands.push(command);
        }
    }

    if capabilities.expressions {
        commands.extend(timeline.expressions.iter().map(|k| {
            AnimationCommand::new(
                clamp(k.timestamp),
                CommandKind::ExpressionChange {
                    expression: k.expression,
                    intensity: k.intensity,
                },
            )
        }));
    }

    if capabilities.motions {
        commands.extend(timeline.motions.iter().map(|m| {
            AnimationCommand::new(clamp(m.timestamp), CommandKind::MotionTrigger { motion: m.motion })
        }));
        commands.extend(timeline.breaths.iter().map(|t| {
            AnimationCommand::new(
                clamp(*t),
                CommandKind::BreathPulse {
                    intensity: breath_intensity,
                },
            )
        }));
    }

    sort_commands(&mut commands);
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Keyframe, MotionCue};

    fn timeline() -> Timeline {
        Timeline {
            duration: 4.0,
            expressions: vec![
                Keyframe { timestamp: 0.0, expression: Expression::Joy, intensity: 0.8 },
                Keyframe { timestamp: 3.5, expression: Expression::Neutral, intensity: 1.0 },
            ],
            motions: vec![MotionCue { timestamp: 0.0, motion: Motion::Bounce }],
            breaths: vec![3.0],
        }
    }

    fn frames() -> Vec<VisemeFrame> {
        (0..4).map(|i| VisemeFrame::silence(i as f64)).collect()
    }

    #[test]
    fn test_priority_breaks_timestamp_ties() {
        let commands = merge(&timeline(), &frames(), CapabilityFlags::default(), 0.3);
        let at_zero: Vec<u8> = commands
            .iter()
            .filter(|c| c.timestamp == 0.0)
            .map(|c| c.priority)
            .collect();
        assert_eq!(at_zero, vec![3, 2, 1]);

        let at_three: Vec<u8> = commands
            .iter()
            .filter(|c| c.timestamp == 3.0)
            .map(|c| c.priority)
            .collect();
        assert_eq!(at_three, vec![3, 0]);
        assert!(commands.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_capabilities_gate_families() {
        let caps = CapabilityFlags {
            lip_sync: false,
            expressions: true,
            motions: false,
        };
        let commands = merge(&timeline(), &frames(), caps, 0.3);
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|c| matches!(c.kind, CommandKind::ExpressionChange { .. })));
    }

    #[test]
    fn test_duplicate_lipsync_timestamps_dropped() {
        let mut frames = frames();
        frames.insert(1, VisemeFrame::silence(0.0));
        frames.push(VisemeFrame::silence(9.0));
        let commands = merge(&timeline(), &frames, CapabilityFlags::default(), 0.3);
        let lipsync: Vec<f64> = commands
            .iter()
            .filter(|c| c.kind.is_lipsync())
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(lipsync, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_wire_format() {
        let command = AnimationCommand::new(
            1.25,
            CommandKind::ExpressionChange {
                expression: Expression::Joy,
                intensity: 0.5,
            },
        );
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "expression_change");
        assert_eq!(value["timestamp"], 1.25);
        assert_eq!(value["priority"], 2);
        assert_eq!(value["expression"], "joy");

        let back: AnimationCommand = serde_json::from_value(value).unwrap();
        assert_eq!(back, command);
    }
}
