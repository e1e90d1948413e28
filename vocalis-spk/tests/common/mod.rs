//! Shared fixtures: closure-backed fake providers

#![allow(dead_code)]

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vocalis_core::{AudioFormat, CostTier, QualityTier};
use vocalis_spk::{
    AvailabilityCache, CustomTtsEngine, EngineOutput, InMemoryPreferenceStore, MemoryStatsSink,
    ProviderCatalog, ProviderDescriptor, ProviderRegistry, ProviderSelector, SpeechConfig, SpeechError,
    StaticCredentials, SynthesisInvoker, TtsEngine,
};

/// Minimal 16-bit mono WAV header followed by `samples` zero samples
pub fn tiny_wav(samples: usize) -> Bytes {
    let data_len = (samples * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&16_000u32.to_le_bytes());
    out.extend_from_slice(&32_000u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + samples * 2, 0);
    Bytes::from(out)
}

pub fn descriptor(id: &str, cost: CostTier, quality: QualityTier) -> ProviderDescriptor {
    ProviderDescriptor::custom(id, &["ko", "en"], cost, quality)
}

/// Engine that always succeeds, counting calls
pub fn ok_engine(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(EngineOutput::new(tiny_wav(1600), AudioFormat::Wav))
    }))
}

/// Engine whose calls fail with an HTTP status
pub fn failing_engine(name: &str, status: u16, calls: Arc<AtomicUsize>) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(SpeechError::Api {
            status,
            message: "upstream error".to_string(),
        })
    }))
}

/// Engine that reports itself unavailable
pub fn offline_engine(name: &str) -> Arc<dyn TtsEngine> {
    Arc::new(
        CustomTtsEngine::new(name, |_req| Err(SpeechError::Unavailable("offline".to_string())))
            .with_availability(|| false),
    )
}

/// Engine that never answers within any sane timeout
pub fn hanging_engine(name: &str) -> Arc<dyn TtsEngine> {
    Arc::new(CustomTtsEngine::from_async(name, |_req| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(EngineOutput::new(tiny_wav(10), AudioFormat::Wav))
        })
    }))
}

pub struct Harness {
    pub registry: Arc<ProviderRegistry>,
    pub availability: Arc<AvailabilityCache>,
    pub preferences: Arc<InMemoryPreferenceStore>,
    pub stats: Arc<MemoryStatsSink>,
    pub selector: ProviderSelector,
    pub invoker: SynthesisInvoker,
}

pub fn harness(providers: Vec<(ProviderDescriptor, Arc<dyn TtsEngine>)>, config: SpeechConfig) -> Harness {
    let catalog = ProviderCatalog::new(providers.iter().map(|(d, _)| d.clone()).collect()).unwrap();
    let availability = Arc::new(AvailabilityCache::new(config.availability_ttl()));
    let registry = Arc::new(ProviderRegistry::new(catalog, config, Arc::new(StaticCredentials::new())).unwrap());
    for (descriptor, engine) in providers {
        registry.register_engine(&descriptor.id, engine).unwrap();
    }
    let preferences = Arc::new(InMemoryPreferenceStore::new());
    let stats = Arc::new(MemoryStatsSink::new());
    let selector = ProviderSelector::new(registry.clone(), availability.clone(), preferences.clone());
    let invoker = SynthesisInvoker::new(registry.clone(), availability.clone(), stats.clone());
    Harness {
        registry,
        availability,
        preferences,
        stats,
        selector,
        invoker,
    }
}
