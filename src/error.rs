//! Error types for Lector

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for Lector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Lector
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Captured image rejected before recognition
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Recognition found no legible text
    #[error("no text found in image")]
    NoTextFound,

    /// Recognition provider failed
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Synthesis provider failed or returned no audio
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio output could not be opened or started
    #[error("playback error: {0}")]
    Playback(String),

    /// Upstream provider answered with an error status
    #[error("provider error {status}: {body}")]
    Provider {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body, for logs
        body: String,
    },

    /// A capture is already in flight
    #[error("a capture is already in progress")]
    Busy,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Classify this error in the pipeline failure taxonomy
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NoTextFound => FailureKind::RecognitionNoText,
            Self::Recognition(_) => FailureKind::RecognitionApiError,
            Self::Synthesis(_) => FailureKind::SynthesisUnavailable,
            Self::Decode(_) => FailureKind::DecodeError,
            Self::Playback(_) => FailureKind::PlaybackError,
            _ => FailureKind::GenericFailure,
        }
    }
}

/// Failure classes the orchestrator distinguishes when choosing a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Recognition succeeded but the image held no text (terminal)
    RecognitionNoText,
    /// Recognition provider failed (terminal)
    RecognitionApiError,
    /// No audio payload came back (recovered by announcing)
    SynthesisUnavailable,
    /// Payload was not valid PCM16 base64 (recovered by announcing)
    DecodeError,
    /// Audio output unavailable (recovered by announcing)
    PlaybackError,
    /// Anything else (terminal, generic message)
    GenericFailure,
}

impl FailureKind {
    /// Whether this failure ends the session without speaking the text
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RecognitionNoText | Self::RecognitionApiError | Self::GenericFailure
        )
    }

    /// Stable identifier used in logs and API responses
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecognitionNoText => "RECOGNITION_NO_TEXT",
            Self::RecognitionApiError => "RECOGNITION_API_ERROR",
            Self::SynthesisUnavailable => "SYNTHESIS_UNAVAILABLE",
            Self::DecodeError => "DECODE_ERROR",
            Self::PlaybackError => "PLAYBACK_ERROR",
            Self::GenericFailure => "GENERIC_FAILURE",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
