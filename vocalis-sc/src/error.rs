use thiserror::Error;
use vocalis_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Enhancement stage '{stage}' failed: {message}")]
    Enhancement { stage: String, message: String },

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl AudioError {
    pub fn stage(stage: &str, message: impl Into<String>) -> Self {
        AudioError::Enhancement {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

impl From<AudioError> for CoreError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Core(e) => e,
            AudioError::Io(e) => CoreError::Io(e),
            AudioError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Audio(other.to_string()),
        }
    }
}
