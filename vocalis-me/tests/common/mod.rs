//! Shared fixtures: harmonic vowel clips and engines wired to fake providers

#![allow(dead_code)]

use bytes::Bytes;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vocalis_core::{AudioFormat, CostTier, QualityTier};
use vocalis_me::{AnimationSyncEngine, VocalisConfig};
use vocalis_spk::{
    CustomTtsEngine, EngineOutput, MemoryStatsSink, ProviderCatalog, ProviderDescriptor, SpeechError,
    StaticCredentials, TtsEngine,
};

pub const SAMPLE_RATE: u32 = 16_000;

/// Glottal-like harmonic series at `f0`, each harmonic weighted by two formant resonances
pub fn harmonic_vowel(f1: f64, f2: f64, seconds: f64) -> Vec<f32> {
    let f0 = 120.0;
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let resonance = |f: f64, center: f64, width: f64| 1.0 / (1.0 + ((f - center) / width).powi(2));
    let harmonics: Vec<(f64, f64)> = (1..)
        .map(|k| k as f64 * f0)
        .take_while(|f| *f < 4000.0)
        .map(|f| (f, resonance(f, f1, 90.0) + 0.7 * resonance(f, f2, 120.0) + 0.02))
        .collect();
    let norm: f64 = harmonics.iter().map(|(_, a)| a).sum();

    (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let sum: f64 = harmonics
                .iter()
                .map(|(f, a)| a * (2.0 * std::f64::consts::PI * f * t).sin())
                .sum();
            (0.4 * sum / norm) as f32
        })
        .collect()
}

/// Silence, vowel, silence
pub fn padded_vowel(f1: f64, f2: f64, seconds: f64, pad: f64) -> Vec<f32> {
    let padding = (pad * SAMPLE_RATE as f64) as usize;
    let mut out = vec![0.0; padding];
    out.extend(harmonic_vowel(f1, f2, seconds));
    out.extend(std::iter::repeat(0.0).take(padding));
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

/// Engine returning fixed audio, counting calls
pub fn clip_engine(name: &str, audio: Bytes, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(EngineOutput::new(audio.clone(), AudioFormat::Wav))
    }))
}

/// Engine returning audio with a claimed duration
pub fn claiming_engine(name: &str, audio: Bytes, format: AudioFormat, claimed: f64) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        let mut output = EngineOutput::new(audio.clone(), format);
        output.duration = Some(claimed);
        Ok(output)
    }))
}

pub fn failing_engine(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(SpeechError::Api {
            status: 503,
            message: "upstream down".to_string(),
        })
    }))
}

pub fn offline_engine(name: &str) -> Arc<dyn TtsEngine> {
    Arc::new(
        CustomTtsEngine::new(name, |_req| Err(SpeechError::Unavailable("offline".to_string())))
            .with_availability(|| false),
    )
}

/// Config with a fixed Korean and English chain over the given provider ids
pub fn config_with_chain(ids: &[&str]) -> VocalisConfig {
    let mut config = VocalisConfig::default();
    let chain: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
    config.speech.fallback_chains.insert("ko".to_string(), chain.clone());
    config.speech.fallback_chains.insert("en".to_string(), chain);
    config.speech.enable_cache = false;
    config
}

pub fn engine(providers: Vec<(&str, Arc<dyn TtsEngine>)>, config: VocalisConfig) -> (AnimationSyncEngine, Arc<MemoryStatsSink>) {
    let catalog = ProviderCatalog::new(providers.iter().map(|(id, _)| descriptor(id)).collect()).unwrap();
    let stats = Arc::new(MemoryStatsSink::new());
    let mut builder = AnimationSyncEngine::builder(config)
        .catalog(catalog)
        .credentials(Arc::new(StaticCredentials::new()))
        .stats_sink(stats.clone());
    for (id, engine) in providers {
        builder = builder.engine(id, engine);
    }
    (builder.build().unwrap(), stats)
}
