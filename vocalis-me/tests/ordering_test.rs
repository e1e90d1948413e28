//! Ordering properties of merged command lists

use proptest::prelude::*;
use vocalis_core::{CapabilityFlags, VisemeFrame};
use vocalis_me::{merge, EmotionAnalyzer, TimelinePlanner, AnimationConfig};

fn frames_strategy() -> impl Strategy<Value = Vec<VisemeFrame>> {
    prop::collection::vec(0u32..400, 0..120).prop_map(|mut steps| {
        steps.sort_unstable();
        steps
            .into_iter()
            .map(|s| VisemeFrame::silence(s as f64 / 30.0))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merged_commands_are_sorted_and_unique_per_lipsync_timestamp(
        frames in frames_strategy(),
        duration in 0.1f64..15.0,
        text in "[a-z !]{0,40}",
        lip_sync in any::<bool>(),
        expressions in any::<bool>(),
        motions in any::<bool>(),
    ) {
        let emotion = EmotionAnalyzer::new().analyze(&text, None);
        let planner = TimelinePlanner::new(AnimationConfig::default());
        let timeline = planner.plan(&text, &emotion, duration, 1.0, &[]);
        let caps = CapabilityFlags { lip_sync, expressions, motions };
        let commands = merge(&timeline, &frames, caps, 0.3);

        for pair in commands.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            if pair[0].timestamp == pair[1].timestamp {
                prop_assert!(pair[0].priority >= pair[1].priority);
            }
        }

        let lipsync: Vec<f64> = commands.iter().filter(|c| c.kind.is_lipsync()).map(|c| c.timestamp).collect();
        for pair in lipsync.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        prop_assert!(commands.iter().all(|c| c.timestamp >= 0.0 && c.timestamp <= duration));
        if !lip_sync {
            prop_assert!(lipsync.is_empty());
        }
    }

    #[test]
    fn timeline_respects_clip_bounds(duration in 0.0f64..30.0, confidence_text in "[a-z ]{0,30}") {
        let emotion = EmotionAnalyzer::new().analyze(&confidence_text, None);
        let timeline = TimelinePlanner::new(AnimationConfig::default()).plan(&confidence_text, &emotion, duration, 1.0, &[]);
        prop_assert_eq!(timeline.expressions[0].timestamp, 0.0);
        prop_assert!(timeline.expressions.iter().all(|k| k.timestamp <= duration));
        prop_assert!(timeline.breaths.iter().all(|t| *t < duration - 1.0));
    }
}
