use std::error::Error as StdError;

use thiserror::Error;

/// `cadence`'s crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain-level error kinds, used where a caller needs to branch on *why* something
/// failed rather than just display a message.
///
/// These are plain variants, not exceptions: recoverable kinds (`AudioTooShort`,
/// `AudioLowEnergy`) are returned as ordinary `Err` values from `SpeakerModel::verify`
/// and handled locally by `Session` without any try/catch-style control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AudioTooShort,
    AudioLowEnergy,
    InferenceTimeout,
    DispatcherBusy,
    ModelError,
    ProtocolError,
    FatalInvariant,
}

impl ErrorKind {
    /// The wire-level `msg` string for this kind, used verbatim in the external `Result` frame.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AudioTooShort => "audio_too_short",
            ErrorKind::AudioLowEnergy => "audio_low_energy",
            ErrorKind::InferenceTimeout => "inference_timeout",
            ErrorKind::DispatcherBusy => "dispatcher_busy",
            ErrorKind::ModelError => "model_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::FatalInvariant => "fatal_invariant",
        }
    }

    /// The wire-level `code` for this kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InferenceTimeout | ErrorKind::DispatcherBusy => 1,
            ErrorKind::ModelError => 2,
            ErrorKind::FatalInvariant => 99,
            ErrorKind::AudioTooShort | ErrorKind::AudioLowEnergy | ErrorKind::ProtocolError => 0,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `cadence`'s crate-wide error type.
///
/// Intentionally decoupled from `anyhow` so downstream libraries aren't forced to adopt
/// `anyhow` in their own public APIs; lower-level modules use `anyhow::Result` internally
/// and convert at the boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("{kind}: {message}")]
    Kind { kind: ErrorKind, message: String },

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Kind {
            kind,
            message: message.into(),
        }
    }

    /// Best-effort recovery of the `ErrorKind` carried by this error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Kind { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

/// Recoverable failure modes of [`crate::models::SpeakerModel::verify`].
///
/// Kept as an explicit enum rather than a generic error so `Session` can pattern-match
/// on recoverability without inspecting message strings.
#[derive(Debug, Error)]
pub enum SpeakerVerifyError {
    #[error("audio slice shorter than the minimum duration for speaker verification")]
    TooShort,

    #[error("audio slice RMS energy below the minimum threshold for speaker verification")]
    LowEnergy,

    #[error("speaker model failed: {0}")]
    Model(#[from] anyhow::Error),
}

impl SpeakerVerifyError {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            SpeakerVerifyError::TooShort => ErrorKind::AudioTooShort,
            SpeakerVerifyError::LowEnergy => ErrorKind::AudioLowEnergy,
            SpeakerVerifyError::Model(_) => ErrorKind::ModelError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_wire_codes_match_spec() {
        assert_eq!(ErrorKind::AudioTooShort.code(), 0);
        assert_eq!(ErrorKind::AudioLowEnergy.code(), 0);
        assert_eq!(ErrorKind::InferenceTimeout.code(), 1);
        assert_eq!(ErrorKind::DispatcherBusy.code(), 1);
        assert_eq!(ErrorKind::ModelError.code(), 2);
        assert_eq!(ErrorKind::ProtocolError.code(), 0);
        assert_eq!(ErrorKind::FatalInvariant.code(), 99);
    }

    #[test]
    fn speaker_verify_error_maps_to_expected_kind() {
        assert_eq!(
            SpeakerVerifyError::TooShort.error_kind(),
            ErrorKind::AudioTooShort
        );
        assert_eq!(
            SpeakerVerifyError::LowEnergy.error_kind(),
            ErrorKind::AudioLowEnergy
        );
        let model_err = SpeakerVerifyError::Model(anyhow::anyhow!("boom"));
        assert_eq!(model_err.error_kind(), ErrorKind::ModelError);
    }
}
