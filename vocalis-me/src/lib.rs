//! vocalis-me: emotion-driven animation synchronized to synthesized speech
//!
//! Provides:
//! - Keyword emotion scoring over Korean and English text
//! - Expression, motion and breath timelines scaled to the measured clip duration
//! - A merged, priority-ordered animation command list
//! - Per-session stream ownership with wall-clock paced emission
//! - `AnimationSyncEngine`, which runs the whole request pipeline

pub mod error;
pub mod config;
pub mod emotion;
pub mod timeline;
pub mod command;
pub mod emitter;
pub mod engine;

pub use error::AnimationError;
pub use config::{AnimationConfig, MotionRule, VocalisConfig};
pub use emotion::{EmotionAnalysis, EmotionAnalyzer, Expression, Motion};
pub use timeline::{Keyframe, MotionCue, Timeline, TimelinePlanner};
pub use command::{merge, sort_commands, AnimationCommand, CommandKind};
pub use emitter::{
    ChannelSink, CommandSink, RecordingSink, SessionRegistry, StreamOutcome, StreamStatus, StreamToken, SyncEmitter,
};
pub use engine::{AnimationOutput, AnimationSyncEngine, AnimationSyncEngineBuilder, ProviderStatus, StreamedOutput};
