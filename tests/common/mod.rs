//! Fixtures shared by the workspace tests

#![allow(dead_code)]

use bytes::Bytes;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vocalis_core::{AudioFormat, CostTier, QualityTier, SynthesisRequest};
use vocalis_me::{AnimationSyncEngine, VocalisConfig};
use vocalis_spk::{
    CustomTtsEngine, EngineOutput, MemoryStatsSink, ProviderCatalog, ProviderDescriptor, SpeechError,
    StaticCredentials, TtsEngine,
};

pub const SAMPLE_RATE: u32 = 16_000;

/// Sum of harmonics of a 110 Hz voice, each weighted by formant resonances at `f1` and `f2`
pub fn vowel(f1: f64, f2: f64, seconds: f64) -> Vec<f32> {
    let f0 = 110.0;
    let n = (seconds * SAMPLE_RATE as f64).round() as usize;
    let peak = |f: f64, center: f64, width: f64| 1.0 / (1.0 + ((f - center) / width).powi(2));
    let partials: Vec<(f64, f64)> = (1..36)
        .map(|k| k as f64 * f0)
        .map(|f| (f, peak(f, f1, 90.0) + 0.7 * peak(f, f2, 120.0) + 0.02))
        .collect();
    let total: f64 = partials.iter().map(|(_, a)| a).sum();

    (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let v: f64 = partials
                .iter()
                .map(|(f, a)| a * (2.0 * std::f64::consts::PI * f * t).sin())
                .sum();
            // Gentle attack and release
            let edge = (t / 0.05).min((seconds - t) / 0.05).clamp(0.0, 1.0);
            (0.45 * edge * v / total) as f32
        })
        .collect()
}

/// Alternating vowels separated by short pauses, `seconds` long in total
pub fn utterance(seconds: f64) -> Vec<f32> {
    let formants = [(800.0, 1300.0), (300.0, 2400.0), (350.0, 900.0), (500.0, 1900.0), (550.0, 850.0)];
    let total = (seconds * SAMPLE_RATE as f64).round() as usize;
    let pause = vec![0.0f32; (0.08 * SAMPLE_RATE as f64) as usize];
    let mut out = Vec::with_capacity(total);
    let mut i = 0;
    while out.len() < total {
        let (f1, f2) = formants[i % formants.len()];
        out.extend(vowel(f1, f2, 0.25));
        out.extend_from_slice(&pause);
        i += 1;
    }
    out.truncate(total);
    out
}

pub fn wav(samples: &[f32]) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

pub fn descriptor(id: &str) -> ProviderDescriptor {
    ProviderDescriptor::custom(id, &["ko", "en"], CostTier::Free, QualityTier::Standard)
}

pub fn speaking_engine(name: &str, audio: Bytes, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(EngineOutput::new(audio.clone(), AudioFormat::Wav))
    }))
}

pub fn failing_engine(name: &str, status: u16, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(SpeechError::Api {
            status,
            message: "upstream error".to_string(),
        })
    }))
}

pub fn offline_engine(name: &str) -> Arc<dyn TtsEngine> {
    Arc::new(
        CustomTtsEngine::new(name, |_req| Err(SpeechError::Unavailable("offline".to_string())))
            .with_availability(|| false),
    )
}

pub fn hanging_engine(name: &str) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::from_async(name, |_req| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(SpeechError::Engine("unreachable".to_string()))
        })
    }))
}

pub fn config(chain: &[&str]) -> VocalisConfig {
    let mut config = VocalisConfig::default();
    let chain: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
    config.speech.fallback_chains.insert("ko".to_string(), chain.clone());
    config.speech.fallback_chains.insert("en".to_string(), chain);
    config.speech.enable_cache = false;
    config
}

pub struct TestEngine {
    pub engine: Arc<AnimationSyncEngine>,
    pub stats: Arc<MemoryStatsSink>,
}

pub fn build(providers: Vec<(&str, Arc<dyn TtsEngine>)>, config: VocalisConfig) -> TestEngine {
    let catalog = ProviderCatalog::new(providers.iter().map(|(id, _)| descriptor(id)).collect()).unwrap();
    let stats = Arc::new(MemoryStatsSink::new());
    let mut builder = AnimationSyncEngine::builder(config)
        .catalog(catalog)
        .credentials(Arc::new(StaticCredentials::new()))
        .stats_sink(stats.clone());
    for (id, engine) in providers {
        builder = builder.engine(id, engine);
    }
    TestEngine {
        engine: Arc::new(builder.build().unwrap()),
        stats,
    }
}

pub fn korean(session: &str, text: &str) -> SynthesisRequest {
    SynthesisRequest::new(session, "user-1", text, "ko")
}
