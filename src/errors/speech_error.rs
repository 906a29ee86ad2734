//! Error taxonomy for the speech delivery pipeline.
//!
//! Every failure that can reach a caller is classified into one of the
//! variants below. `Cancelled` is special: it marks work that was superseded
//! by a newer generation and is never reported to the caller as a failure.

use thiserror::Error;

/// Classified speech delivery error.
///
/// The type is `Clone` because a single in-flight network request can be
/// awaited by several callers at once, each of which receives the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// Superseded by a newer `speak()` or an explicit `stop()`
    #[error("Operation superseded by a newer request")]
    Cancelled,

    /// The backend kept rate limiting us until all attempts were used
    #[error("Speech service busy after {attempts} attempts")]
    ServiceBusy { attempts: u32 },

    /// Credential missing, expired or rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No on-device speech capability is available
    #[error("Local speech synthesis is not supported on this platform")]
    UnsupportedPlatform,

    /// The platform refused a programmatic playback start
    #[error("Autoplay blocked by platform policy: {0}")]
    AutoplayBlocked(String),

    /// No completion signal arrived within the bound
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration supplied at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Anything else
    #[error("Speech failed: {0}")]
    Failed(String),
}

/// Result type for speech operations.
pub type SpeechResult<T> = Result<T, SpeechError>;

impl SpeechError {
    /// Whether this error only signals that the work was superseded.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short, actionable message suitable for showing to an end user.
    ///
    /// Raw backend text is deliberately not included here; it is kept in the
    /// `Display` output for logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Cancelled => "Playback stopped",
            Self::ServiceBusy { .. } => "Voice service is busy, please try again",
            Self::AuthenticationFailed(_) => "Your session needs refreshing, please sign in again",
            Self::UnsupportedPlatform => "Speech is not available on this device",
            Self::AutoplayBlocked(_) => "Tap again to play",
            Self::Timeout(_) => "Speech took too long, tap to try again",
            Self::InvalidConfiguration(_) => "Voice settings are invalid",
            Self::Failed(_) => "Could not play speech, tap to try again",
        }
    }
}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(format!("Backend request timed out: {e}"))
        } else {
            Self::Failed(format!("Network request failed: {e}"))
        }
    }
}
