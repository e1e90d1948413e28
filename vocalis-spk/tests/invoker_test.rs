//! Synthesis failover tests

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vocalis_core::{AudioFormat, CostTier, DurationSource, QualityTier, SynthesisRequest};
use vocalis_spk::{
    CustomTtsEngine, EngineOutput, PlannedProvider, ProviderErrorKind, ProviderPlan, SpeechConfig, SpeechError,
    SynthesisInvoker, TtsEngine, UserPreference,
};

fn plan(ids: &[&str]) -> ProviderPlan {
    ProviderPlan {
        language: "ko".to_string(),
        chain: ids
            .iter()
            .map(|id| PlannedProvider {
                id: id.to_string(),
                voice: "ko".to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_fallback_to_second_provider() {
    let p1_calls = Arc::new(AtomicUsize::new(0));
    let p2_calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![
            (descriptor("p1", CostTier::Paid, QualityTier::Premium), failing_engine("p1", 503, p1_calls.clone())),
            (descriptor("p2", CostTier::Free, QualityTier::Basic), ok_engine("p2", p2_calls.clone())),
        ],
        SpeechConfig::default(),
    );
    h.availability.set("p1", "ko", true);

    let request = SynthesisRequest::new("s1", "u1", "안녕하세요", "ko-KR");
    let result = h.invoker.synthesize(&request, &plan(&["p1", "p2"])).await.unwrap();

    assert_eq!(result.provider, "p2");
    assert_eq!(result.attempts, vec!["p1", "p2"]);
    assert!(SynthesisInvoker::used_fallback(&result));
    assert_eq!(result.format, AudioFormat::Wav);
    assert_eq!(result.duration_source, DurationSource::Estimated);
    assert!(!result.cost.cache_hit);

    // injected engines are called once per attempt
    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);

    let p1_stats = h.registry.stats("p1").unwrap();
    assert_eq!(p1_stats.failures, 1);
    assert_eq!(h.registry.stats("p2").unwrap().successes, 1);
    assert_eq!(h.stats.failures_for("p1"), 1);
    assert_eq!(h.stats.len(), 2);

    // failure evicts the cached health entry
    assert_eq!(h.availability.get("p1", "ko"), None);
    assert_eq!(h.availability.get("p2", "ko"), Some(true));
}

#[tokio::test]
async fn test_all_unavailable_is_terminal() {
    let h = harness(
        vec![
            (descriptor("a", CostTier::Free, QualityTier::Basic), offline_engine("a")),
            (descriptor("b", CostTier::Free, QualityTier::Basic), offline_engine("b")),
        ],
        SpeechConfig::default(),
    );

    let request = SynthesisRequest::new("s1", "u1", "hello", "en");
    let err = h.invoker.synthesize(&request, &plan(&["a", "b"])).await.unwrap_err();

    match err {
        SpeechError::AllProvidersFailed { attempted, .. } => assert_eq!(attempted, vec!["a", "b"]),
        other => panic!("unexpected error: {}", other),
    }
    // unavailability is not a call failure
    assert!(h.registry.stats("a").is_none());
    assert_eq!(h.availability.get("a", "ko"), Some(false));
    assert_eq!(h.stats.records().iter().filter(|r| r.success).count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_advances_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![
            (descriptor("slow", CostTier::Paid, QualityTier::Premium), hanging_engine("slow")),
            (descriptor("fast", CostTier::Free, QualityTier::Basic), ok_engine("fast", calls)),
        ],
        SpeechConfig::default(),
    );

    let request = SynthesisRequest::new("s1", "u1", "hello", "en");
    let result = h.invoker.synthesize(&request, &plan(&["slow", "fast"])).await.unwrap();
    assert_eq!(result.provider, "fast");

    let failure = h
        .stats
        .records()
        .into_iter()
        .find(|r| r.provider == "slow")
        .unwrap();
    assert_eq!(failure.error_kind.as_deref(), Some(ProviderErrorKind::Timeout.to_string().as_str()));
}

#[tokio::test]
async fn test_auth_failures_invalidate_after_threshold() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![
            (descriptor("denied", CostTier::Paid, QualityTier::Premium), failing_engine("denied", 401, calls.clone())),
            (
                descriptor("backup", CostTier::Free, QualityTier::Basic),
                ok_engine("backup", Arc::new(AtomicUsize::new(0))),
            ),
        ],
        SpeechConfig::default(),
    );

    for i in 0..3 {
        let request = SynthesisRequest::new("s1", "u1", format!("text {}", i), "en");
        let result = h.invoker.synthesize(&request, &plan(&["denied", "backup"])).await.unwrap();
        assert_eq!(result.provider, "backup");
    }

    // 401 is not retried
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let stats = h.registry.stats("denied").unwrap();
    assert_eq!(stats.consecutive_failures, 3);
    assert!(!h.registry.is_cached("denied"));
}

#[tokio::test]
async fn test_cache_hit_skips_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![(descriptor("p", CostTier::Free, QualityTier::Basic), ok_engine("p", calls.clone()))],
        SpeechConfig::default(),
    );

    let request = SynthesisRequest::new("s1", "u1", "cached words", "en");
    let first = h.invoker.synthesize(&request, &plan(&["p"])).await.unwrap();
    let second = h.invoker.synthesize(&request, &plan(&["p"])).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(second.cost.cache_hit);
    assert_eq!(second.latency, std::time::Duration::ZERO);
    assert_eq!(second.provider, "p");
    assert_eq!(first.audio, second.audio);
}

#[tokio::test]
async fn test_cached_audio_follows_each_users_plan() {
    let p1_calls = Arc::new(AtomicUsize::new(0));
    let p2_calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![
            (descriptor("p1", CostTier::Paid, QualityTier::Premium), ok_engine("p1", p1_calls.clone())),
            (descriptor("p2", CostTier::Free, QualityTier::Basic), ok_engine("p2", p2_calls.clone())),
        ],
        SpeechConfig::default(),
    );
    for (user, preferred) in [("alice", "p2"), ("bob", "p1")] {
        h.preferences.set(
            user,
            UserPreference {
                preferred_provider: Some(preferred.to_string()),
                ..Default::default()
            },
        );
    }

    let alice = SynthesisRequest::new("s1", "alice", "같은 문장입니다", "ko");
    let alice_plan = h.selector.select_for(&alice).await.unwrap();
    assert_eq!(alice_plan.primary().unwrap().id, "p2");
    let first = h.invoker.synthesize(&alice, &alice_plan).await.unwrap();
    assert_eq!(first.provider, "p2");

    let bob = SynthesisRequest::new("s2", "bob", "같은 문장입니다", "ko");
    let bob_plan = h.selector.select_for(&bob).await.unwrap();
    assert_eq!(bob_plan.primary().unwrap().id, "p1");
    let result = h.invoker.synthesize(&bob, &bob_plan).await.unwrap();
    assert_eq!(result.provider, "p1");
    assert!(!result.cost.cache_hit);
    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);

    // Same plan primary again is served from cache
    let again = h.invoker.synthesize(&alice, &alice_plan).await.unwrap();
    assert!(again.cost.cache_hit);
    assert_eq!(again.provider, "p2");
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_audio_is_not_cached_for_the_failed_primary() {
    let p1_calls = Arc::new(AtomicUsize::new(0));
    let p2_calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        vec![
            (descriptor("p1", CostTier::Paid, QualityTier::Premium), failing_engine("p1", 503, p1_calls.clone())),
            (descriptor("p2", CostTier::Free, QualityTier::Basic), ok_engine("p2", p2_calls.clone())),
        ],
        SpeechConfig::default(),
    );

    let request = SynthesisRequest::new("s1", "u1", "다시 시도", "ko");
    h.invoker.synthesize(&request, &plan(&["p1", "p2"])).await.unwrap();
    let second = h.invoker.synthesize(&request, &plan(&["p1", "p2"])).await.unwrap();

    assert!(!second.cost.cache_hit);
    assert_eq!(p1_calls.load(Ordering::SeqCst), 2);

    // A plan led by the provider that actually served the audio hits the cache
    let direct = h.invoker.synthesize(&request, &plan(&["p2"])).await.unwrap();
    assert!(direct.cost.cache_hit);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_engine_reported_duration_is_nominal() {
    let engine: Arc<dyn TtsEngine> = Arc::new(CustomTtsEngine::new("timed", |_req| {
        Ok(EngineOutput {
            audio: tiny_wav(100),
            format: None,
            duration: Some(2.5),
        })
    }));
    let mut config = SpeechConfig::default();
    config.enable_cache = false;
    let h = harness(vec![(descriptor("timed", CostTier::Free, QualityTier::Basic), engine)], config);

    let request = SynthesisRequest::new("s1", "u1", "hello", "en");
    let result = h.invoker.synthesize(&request, &plan(&["timed"])).await.unwrap();
    assert_eq!(result.duration, 2.5);
    // format sniffed from RIFF header
    assert_eq!(result.format, AudioFormat::Wav);
}

#[tokio::test]
async fn test_empty_audio_is_a_provider_error() {
    let empty: Arc<dyn TtsEngine> = Arc::new(CustomTtsEngine::new("empty", |_req| {
        Ok(EngineOutput::new(bytes::Bytes::new(), AudioFormat::Wav))
    }));
    let h = harness(
        vec![
            (descriptor("empty", CostTier::Free, QualityTier::Premium), empty),
            (descriptor("good", CostTier::Free, QualityTier::Basic), ok_engine("good", Arc::new(AtomicUsize::new(0)))),
        ],
        SpeechConfig::default(),
    );
    let request = SynthesisRequest::new("s1", "u1", "hello", "en");
    let result = h.invoker.synthesize(&request, &plan(&["empty", "good"])).await.unwrap();
    assert_eq!(result.provider, "good");
    assert_eq!(h.registry.stats("empty").unwrap().failures, 1);
}
