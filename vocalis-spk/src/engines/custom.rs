//! Custom TTS engine implementation
//! Lets callers inject their own synthesis function (in-house services, test fakes)

use crate::engines::{EngineOutput, EngineRequest, TtsEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

type SyncSynthesizeFn = dyn Fn(&EngineRequest) -> Result<EngineOutput, SpeechError> + Send + Sync;
type AsyncSynthesizeFn =
    dyn Fn(EngineRequest) -> BoxFuture<'static, Result<EngineOutput, SpeechError>> + Send + Sync;

enum Synthesize {
    Sync(Arc<SyncSynthesizeFn>),
    Async(Arc<AsyncSynthesizeFn>),
}

/// Closure-backed TTS engine
pub struct CustomTtsEngine {
    name: String,
    synthesize_fn: Synthesize,
    voices: Vec<String>,
    is_available_fn: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl CustomTtsEngine {
    /// Create an engine from a synchronous synthesis function
    pub fn new<F>(name: impl Into<String>, synthesize_fn: F) -> Self
    where
        F: Fn(&EngineRequest) -> Result<EngineOutput, SpeechError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            synthesize_fn: Synthesize::Sync(Arc::new(synthesize_fn)),
            voices: Vec::new(),
            is_available_fn: Arc::new(|| true),
        }
    }

    /// Create an engine from an async synthesis function.
    /// The future is awaited on the caller's runtime.
    pub fn from_async<F>(name: impl Into<String>, synthesize_fn: F) -> Self
    where
        F: Fn(EngineRequest) -> BoxFuture<'static, Result<EngineOutput, SpeechError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            synthesize_fn: Synthesize::Async(Arc::new(synthesize_fn)),
            voices: Vec::new(),
            is_available_fn: Arc::new(|| true),
        }
    }

    pub fn with_voices(mut self, voices: Vec<String>) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_availability<F>(mut self, is_available_fn: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.is_available_fn = Arc::new(is_available_fn);
        self
    }
}

#[async_trait]
impl TtsEngine for CustomTtsEngine {
    async fn synthesize(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        if request.text.is_empty() {
            return Err(SpeechError::Engine("Text cannot be empty".to_string()));
        }

        match &self.synthesize_fn {
            Synthesize::Sync(f) => f(request),
            Synthesize::Async(f) => f(request.clone()).await,
        }
    }

    async fn list_voices(&self, _language: &str) -> Result<Vec<String>, SpeechError> {
        Ok(self.voices.clone())
    }

    fn is_available(&self) -> bool {
        (self.is_available_fn)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
