//! Error types for vocalis-spk

use std::fmt;
use thiserror::Error;
use vocalis_core::Error as CoreError;

/// Why a provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    Quota,
    Auth,
    Http,
    Malformed,
    Engine,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Quota => "quota",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::Http => "http",
            ProviderErrorKind::Malformed => "malformed",
            ProviderErrorKind::Engine => "engine",
        };
        f.write_str(name)
    }
}

/// Speech synthesis errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Provider '{provider}' failed ({kind}): {message}")]
    ProviderError {
        provider: String,
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("All providers failed for '{language}' (tried: [{}])", .attempted.join(", "))]
    AllProvidersFailed {
        language: String,
        attempted: Vec<String>,
    },

    #[error("No provider available for language '{0}'")]
    NoProviderAvailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    /// Attribute an engine-level error to a provider, classifying it
    pub fn for_provider(self, provider: &str) -> SpeechError {
        let (kind, message) = match self {
            SpeechError::Unavailable(reason) => {
                return SpeechError::ProviderUnavailable {
                    provider: provider.to_string(),
                    reason,
                }
            }
            err @ SpeechError::ProviderUnavailable { .. } => return err,
            err @ SpeechError::ProviderError { .. } => return err,
            SpeechError::Api { status, message } => {
                let kind = match status {
                    429 => ProviderErrorKind::Quota,
                    401 | 403 => ProviderErrorKind::Auth,
                    _ => ProviderErrorKind::Http,
                };
                (kind, format!("status {}: {}", status, message))
            }
            SpeechError::Malformed(msg) => (ProviderErrorKind::Malformed, msg),
            other => (ProviderErrorKind::Engine, other.to_string()),
        };
        SpeechError::ProviderError {
            provider: provider.to_string(),
            kind,
            message,
        }
    }

    pub fn timeout(provider: &str, after_ms: u64) -> SpeechError {
        SpeechError::ProviderError {
            provider: provider.to_string(),
            kind: ProviderErrorKind::Timeout,
            message: format!("no response after {} ms", after_ms),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SpeechError::ProviderUnavailable { .. } | SpeechError::Unavailable(_))
    }
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        CoreError::Synthesis(err.to_string())
    }
}
