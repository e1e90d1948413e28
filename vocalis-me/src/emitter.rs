//! Per-session stream ownership and wall-clock paced command emission

use crate::command::AnimationCommand;
use crate::error::AnimationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vocalis_core::SessionId;

/// Ownership of the active stream for one session
#[derive(Debug, Clone)]
pub struct StreamToken {
    pub session_id: SessionId,
    pub stream_id: Uuid,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    active: Arc<AtomicBool>,
}

impl StreamToken {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// At most one active stream per session; a newer stream supersedes the older one
#[derive(Debug, Default)]
pub struct SessionRegistry {
    streams: DashMap<SessionId, StreamToken>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, marking any previous stream inactive
    pub fn begin(&self, session_id: &str) -> StreamToken {
        let token = StreamToken {
            session_id: session_id.to_string(),
            stream_id: Uuid::new_v4(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            started_at: Utc::now(),
            active: Arc::new(AtomicBool::new(true)),
        };
        if let Some(previous) = self.streams.insert(session_id.to_string(), token.clone()) {
            previous.deactivate();
            info!(
                session = %session_id,
                superseded = %previous.stream_id,
                stream = %token.stream_id,
                "Stream superseded by newer request"
            );
        }
        token
    }

    /// Release the session if `token` still owns it
    pub fn finish(&self, token: &StreamToken) {
        token.deactivate();
        self.streams
            .remove_if(&token.session_id, |_, current| current.generation == token.generation);
    }

    /// Cancel whatever stream the session has; returns whether one was active
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.streams.remove(session_id) {
            Some((_, token)) => {
                token.deactivate();
                info!(session = %session_id, stream = %token.stream_id, "Stream cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.streams
            .get(session_id)
            .map(|t| t.is_active())
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.streams.len()
    }
}

/// Receiver of streamed commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: AnimationCommand) -> Result<(), AnimationError>;
}

/// Forwards commands into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AnimationCommand>,
}

impl ChannelSink {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AnimationCommand>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn send(&self, command: AnimationCommand) -> Result<(), AnimationError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AnimationError::Stream("command receiver dropped".to_string()))
    }
}

/// Records commands with the time they arrived, relative to sink creation
#[derive(Debug)]
pub struct RecordingSink {
    created: Instant,
    received: Mutex<Vec<(Duration, AnimationCommand)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<(Duration, AnimationCommand)> {
        self.received.lock().clone()
    }

    pub fn commands(&self) -> Vec<AnimationCommand> {
        self.received.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: AnimationCommand) -> Result<(), AnimationError> {
        let elapsed = self.created.elapsed();
        self.received.lock().push((elapsed, command));
        Ok(())
    }
}

/// How a paced stream ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Completed,
    /// A newer request for the session, or an explicit cancel, took over
    Superseded,
    SinkClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamOutcome {
    pub session_id: SessionId,
    pub stream_id: Uuid,
    pub emitted: usize,
    pub total: usize,
    pub status: StreamStatus,
}

/// Emits commands when their timestamp comes due, measured from stream start
#[derive(Debug, Clone)]
pub struct SyncEmitter {
    pacing_interval: Duration,
}

impl SyncEmitter {
    pub fn new(pacing_interval: Duration) -> Self {
        Self {
            pacing_interval: pacing_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn pacing_interval(&self) -> Duration {
        self.pacing_interval
    }

    /// Pace `commands` (sorted by timestamp) into `sink`.
    ///
    /// Sleeps in slices of at most one pacing interval and checks the token
    /// between slices, so a superseded stream stops within one interval.
    pub async fn emit_paced(
        &self,
        token: &StreamToken,
        commands: &[AnimationCommand],
        sink: &dyn CommandSink,
    ) -> StreamOutcome {
        let start = Instant::now();
        let mut emitted = 0;
        let finish = |emitted: usize, status: StreamStatus| StreamOutcome {
            session_id: token.session_id.clone(),
            stream_id: token.stream_id,
            emitted,
            total: commands.len(),
            status,
        };

        debug!(
            session = %token.session_id,
            stream = %token.stream_id,
            commands = commands.len(),
            "Paced stream started"
        );

        for command in commands {
            let offset = if command.timestamp.is_finite() {
                Duration::from_secs_f64(command.timestamp.max(0.0))
            } else {
                Duration::ZERO
            };
            let due = start + offset;

            loop {
                if !token.is_active() {
                    info!(
                        session = %token.session_id,
                        stream = %token.stream_id,
                        emitted,
                        "Stream stopped: superseded"
                    );
                    return finish(emitted, StreamStatus::Superseded);
                }
                let now = Instant::now();
                if now >= due {
                    break;
                }
                tokio::time::sleep((due - now).min(self.pacing_interval)).await;
            }

            if let Err(e) = sink.send(command.clone()).await {
                warn!(session = %token.session_id, error = %e, emitted, "Stream stopped: sink closed");
                return finish(emitted, StreamStatus::SinkClosed);
            }
            emitted += 1;
        }

        debug!(session = %token.session_id, emitted, "Paced stream completed");
        finish(emitted, StreamStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;

    fn breath(timestamp: f64) -> AnimationCommand {
        AnimationCommand::new(timestamp, CommandKind::BreathPulse { intensity: 0.3 })
    }

    #[test]
    fn test_new_stream_supersedes_previous() {
        let registry = SessionRegistry::new();
        let first = registry.begin("s1");
        let second = registry.begin("s1");
        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(registry.active_count(), 1);

        // Finishing the stale stream must not release the newer one
        registry.finish(&first);
        assert!(registry.is_active("s1"));

        registry.finish(&second);
        assert!(!registry.is_active("s1"));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_cancel() {
        let registry = SessionRegistry::new();
        let token = registry.begin("s1");
        let other = registry.begin("s2");
        assert!(registry.cancel("s1"));
        assert!(!token.is_active());
        assert!(other.is_active());
        assert!(!registry.cancel("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_arrive_on_schedule() {
        let registry = SessionRegistry::new();
        let token = registry.begin("s1");
        let sink = RecordingSink::new();
        let emitter = SyncEmitter::new(Duration::from_millis(33));

        let commands = vec![breath(0.0), breath(0.5), breath(1.0)];
        let outcome = emitter.emit_paced(&token, &commands, &sink).await;

        assert_eq!(outcome.status, StreamStatus::Completed);
        assert_eq!(outcome.emitted, 3);
        let arrivals: Vec<Duration> = sink.received().into_iter().map(|(t, _)| t).collect();
        for (arrival, expected) in arrivals.iter().zip([0u64, 500, 1000]) {
            let expected = Duration::from_millis(expected);
            assert!(*arrival >= expected, "{:?} < {:?}", arrival, expected);
            assert!(*arrival < expected + Duration::from_millis(5), "{:?} late", arrival);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_stops_within_one_interval() {
        let registry = Arc::new(SessionRegistry::new());
        let token = registry.begin("s1");
        let sink = Arc::new(RecordingSink::new());
        let emitter = SyncEmitter::new(Duration::from_millis(33));
        let commands: Vec<AnimationCommand> = (0..10).map(|i| breath(i as f64)).collect();

        let task = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { emitter.emit_paced(&token, &commands, sink.as_ref()).await })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let superseded_at = Instant::now();
        let _newer = registry.begin("s1");

        let outcome = task.await.unwrap();
        assert_eq!(outcome.status, StreamStatus::Superseded);
        assert_eq!(outcome.emitted, 3);
        assert!(Instant::now() - superseded_at <= Duration::from_millis(33));
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::channel(4);
        tokio_test::block_on(async {
            sink.send(breath(0.0)).await.unwrap();
            sink.send(breath(3.0)).await.unwrap();
        });
        assert_eq!(rx.try_recv().unwrap().timestamp, 0.0);
        assert_eq!(rx.try_recv().unwrap().timestamp, 3.0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_stream() {
        let registry = SessionRegistry::new();
        let token = registry.begin("s1");
        let (sink, rx) = ChannelSink::channel(4);
        drop(rx);
        let outcome = SyncEmitter::new(Duration::from_millis(33))
            .emit_paced(&token, &[breath(0.0)], &sink)
            .await;
        assert_eq!(outcome.status, StreamStatus::SinkClosed);
        assert_eq!(outcome.emitted, 0);
    }
}
