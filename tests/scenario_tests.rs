//! End-to-end scenarios through the full engine

mod common;

use common::*;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use vocalis_core::{DurationSource, Emotion, VisemeCategory};
use vocalis_me::{CommandKind, Expression, Motion};

const FRAME: f64 = 1.0 / 30.0;

#[tokio::test]
async fn test_korean_greeting_visemes_span_measured_duration() {
    let audio = wav(&utterance(1.2));
    let t = build(
        vec![("p1", speaking_engine("p1", audio, Arc::new(AtomicUsize::new(0))))],
        config(&["p1"]),
    );

    let output = t.engine.process(&korean("s1", "안녕하세요")).await.unwrap();
    let result = output.result;
    assert_eq!(result.duration_source, DurationSource::Measured);
    assert!((result.duration - 1.2).abs() < 1e-3);

    let visemes = result.visemes.expect("lip sync was requested");
    assert!(!visemes.is_empty());
    assert_eq!(visemes[0].timestamp, 0.0);
    let span = visemes.last().unwrap().timestamp;
    assert!(span <= result.duration);
    assert!(result.duration - span <= FRAME + 1e-6, "span {} vs duration {}", span, result.duration);
    assert!(visemes.iter().any(|f| f.category != VisemeCategory::Silence));
    assert!(visemes.iter().any(|f| f.category == VisemeCategory::Silence));
}

#[tokio::test]
async fn test_joy_flagged_request_opens_with_joy() {
    let audio = wav(&utterance(1.0));
    let t = build(
        vec![("p1", speaking_engine("p1", audio, Arc::new(AtomicUsize::new(0))))],
        config(&["p1"]),
    );

    let request = korean("s1", "오늘 날씨가 어때요").with_emotion(Emotion::Joy);
    let output = t.engine.process(&request).await.unwrap();

    assert_eq!(output.emotion.expression(), Expression::Joy);
    let first = output.timeline.expressions.first().unwrap();
    assert_eq!(first.timestamp, 0.0);
    assert_eq!(first.expression, Expression::Joy);

    let first_expression = output
        .commands
        .iter()
        .find(|c| matches!(c.kind, CommandKind::ExpressionChange { .. }))
        .unwrap();
    assert_eq!(first_expression.timestamp, 0.0);
    let json = serde_json::to_value(first_expression).unwrap();
    assert_eq!(json["type"], "expression_change");
    assert_eq!(json["expression"], "joy");
}

#[tokio::test]
async fn test_six_second_clip_returns_to_neutral() {
    let audio = wav(&utterance(6.0));
    let t = build(
        vec![("p1", speaking_engine("p1", audio, Arc::new(AtomicUsize::new(0))))],
        config(&["p1"]),
    );

    let output = t.engine.process(&korean("s1", "타로 카드를 한 장 뽑아 볼게요")).await.unwrap();
    assert!((output.result.duration - 6.0).abs() < 1e-9);

    let neutral = output
        .timeline
        .expressions
        .iter()
        .find(|k| k.expression == Expression::Neutral)
        .unwrap();
    assert!((neutral.timestamp - 5.5).abs() < 1e-9);

    // One breath at 3 s; the card context adds a reveal at 20 %
    let breaths: Vec<f64> = output
        .commands
        .iter()
        .filter(|c| matches!(c.kind, CommandKind::BreathPulse { .. }))
        .map(|c| c.timestamp)
        .collect();
    assert_eq!(breaths, vec![3.0]);
    let reveal = output
        .commands
        .iter()
        .find(|c| c.kind == CommandKind::MotionTrigger { motion: Motion::CardReveal })
        .unwrap();
    assert!((reveal.timestamp - 1.2).abs() < 1e-9);

    // 96 000 samples at a 533-sample hop
    let lipsync = output.commands.iter().filter(|c| c.kind.is_lipsync()).count();
    assert_eq!(lipsync, 181);
    assert!(output.commands.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}
