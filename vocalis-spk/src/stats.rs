//! Usage telemetry emitted after every synthesis attempt

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One synthesis attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageRecord {
    pub provider: String,
    pub session_id: String,
    pub success: bool,
    pub characters: usize,
    /// Nominal audio duration in seconds (successful attempts only)
    pub audio_duration: Option<f64>,
    pub latency_ms: u64,
    /// Failure classification ("timeout", "quota", "unavailable", ...)
    pub error_kind: Option<String>,
    pub cache_hit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of usage telemetry
pub trait StatsSink: Send + Sync {
    fn record(&self, record: &UsageRecord);
}

/// Writes one structured log event per attempt
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn record(&self, record: &UsageRecord) {
        if record.success {
            info!(
                provider = %record.provider,
                session = %record.session_id,
                characters = record.characters,
                audio_duration = record.audio_duration.unwrap_or_default(),
                latency_ms = record.latency_ms,
                cache_hit = record.cache_hit,
                "Synthesis attempt succeeded"
            );
        } else {
            warn!(
                provider = %record.provider,
                session = %record.session_id,
                characters = record.characters,
                latency_ms = record.latency_ms,
                error_kind = record.error_kind.as_deref().unwrap_or("unknown"),
                "Synthesis attempt failed"
            );
        }
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryStatsSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }

    pub fn failures_for(&self, provider: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.provider == provider && !r.success)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl StatsSink for MemoryStatsSink {
    fn record(&self, record: &UsageRecord) {
        self.records.lock().push(record.clone());
    }
}
