use std::path::PathBuf;

/// Error type returned by Generation Engine backends.
///
/// Backends are free to surface whatever error they produce; the lifecycle
/// manager and the orchestrator classify it.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for engine backends.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum VoiceCloneError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Reference audio not found: {}", .0.display())]
    SourceAudioNotFound(PathBuf),
    #[error("Voice identity '{0}' not found. Extract it from a reference recording first.")]
    IdentityNotFound(String),
    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode audio {}: {reason}", .path.display())]
    AudioDecode { path: PathBuf, reason: String },
    #[error("Generation engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VoiceCloneError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn decode(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::AudioDecode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoiceCloneError>;
