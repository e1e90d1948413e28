//! Bounded cache of synthesized audio

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use vocalis_core::{AudioFormat, CostTier, Prosody};

const MAX_ENTRY_SIZE: usize = 10 * 1024 * 1024;

/// A cached synthesis output
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub audio: Bytes,
    pub format: AudioFormat,
    pub duration: f64,
    pub provider: String,
    pub voice: String,
    pub cost_tier: CostTier,
    pub cached_at: chrono::DateTime<chrono::Utc>,
    sequence: u64,
}

/// Audio cache keyed by a digest of the synthesis inputs, evicting oldest entries
/// down to 80 % of its budget
pub struct AudioCache {
    max_bytes: usize,
    entries: RwLock<HashMap<String, CachedAudio>>,
    next_sequence: AtomicU64,
}

impl AudioCache {
    pub fn new(max_size_mb: u64) -> Self {
        let max_bytes = max_size_mb
            .min(10_000)
            .checked_mul(1024 * 1024)
            .unwrap_or(1024 * 1024 * 1024) as usize;
        Self {
            max_bytes,
            entries: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Cache key over text, language, the serving provider and voice, and prosody
    pub fn key(text: &str, language: &str, provider: &str, voice: &str, prosody: &Prosody) -> String {
        let mut hasher = Sha256::new();
        for part in [text, language, provider, voice] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update(prosody.speed.to_le_bytes());
        hasher.update(prosody.pitch.to_le_bytes());
        hasher.update(prosody.volume.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<CachedAudio> {
        let hit = self.entries.read().get(key).cloned();
        if hit.is_some() {
            debug!("Audio cache hit");
        }
        hit
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        key: String,
        audio: Bytes,
        format: AudioFormat,
        duration: f64,
        provider: &str,
        voice: &str,
        cost_tier: CostTier,
    ) {
        if audio.len() > MAX_ENTRY_SIZE || audio.len() > self.max_bytes {
            debug!("Audio too large to cache ({} bytes)", audio.len());
            return;
        }
        self.entries.write().insert(
            key,
            CachedAudio {
                audio,
                format,
                duration,
                provider: provider.to_string(),
                voice: voice.to_string(),
                cost_tier,
                cached_at: chrono::Utc::now(),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.cleanup();
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.read().values().map(|c| c.audio.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn cleanup(&self) {
        let mut entries = self.entries.write();
        let total: usize = entries.values().map(|c| c.audio.len()).sum();
        if total <= self.max_bytes {
            return;
        }

        let target = self.max_bytes / 100 * 80;
        let mut by_age: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.sequence, v.audio.len()))
            .collect();
        by_age.sort_by_key(|(_, sequence, _)| *sequence);

        let mut remaining = total;
        let mut removed = 0;
        for (key, _, size) in by_age {
            if remaining <= target {
                break;
            }
            entries.remove(&key);
            remaining -= size;
            removed += 1;
        }
        info!("Audio cache trimmed: removed {} entries, {} bytes remain", removed, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_inputs() {
        let prosody = Prosody::default();
        let a = AudioCache::key("hello", "en", "openai", "alloy", &prosody);
        let b = AudioCache::key("hello", "ko", "openai", "alloy", &prosody);
        let c = AudioCache::key("hello", "en", "openai", "nova", &prosody);
        let faster = Prosody {
            speed: 1.5,
            ..prosody
        };
        let d = AudioCache::key("hello", "en", "openai", "alloy", &faster);
        let e = AudioCache::key("hello", "en", "elevenlabs", "alloy", &prosody);
        assert_eq!(a, AudioCache::key("hello", "en", "openai", "alloy", &prosody));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
        // Field boundaries are length-prefixed
        assert_ne!(
            AudioCache::key("hello", "en", "ab", "c", &prosody),
            AudioCache::key("hello", "en", "a", "bc", &prosody)
        );
    }

    #[test]
    fn test_eviction_to_budget() {
        let cache = AudioCache::new(1);
        let chunk = Bytes::from(vec![0u8; 300 * 1024]);
        for i in 0..4 {
            cache.insert(
                format!("k{}", i),
                chunk.clone(),
                AudioFormat::Wav,
                1.0,
                "espeak",
                "ko",
                CostTier::Free,
            );
        }
        assert!(cache.total_bytes() <= 1024 * 1024 / 100 * 80);
        assert!(cache.get("k3").is_some());
    }
}
