//! Error types for model calls and response parsing

use std::time::Duration;

/// The external model call failed or timed out
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No API key configured
    #[error("no API key configured for model gateway")]
    MissingApiKey,

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("model API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Call exceeded its deadline
    #[error("model call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Reply carried no text
    #[error("model returned an empty response")]
    EmptyResponse,

    /// Reply envelope could not be decoded
    #[error("invalid response envelope: {0}")]
    InvalidResponse(String),

    /// Gateway refused the call (stubs, disabled backends)
    #[error("model unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Check if error is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Model output was not valid structured data after fence stripping
///
/// Always carries the raw text verbatim so a later repair pass can retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not JSON at all
    #[error("model output is not valid JSON: {reason}")]
    Malformed { reason: String, raw: String },

    /// JSON, but not the expected shape
    #[error("model output has unexpected shape: expected {expected}")]
    UnexpectedShape { expected: String, raw: String },
}

impl ParseError {
    /// Create malformed error
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Create shape error
    pub fn unexpected_shape(expected: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            expected: expected.into(),
            raw: raw.into(),
        }
    }

    /// The original model text
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Malformed { raw, .. } | Self::UnexpectedShape { raw, .. } => raw,
        }
    }

    /// Take the original model text
    #[must_use]
    pub fn into_raw(self) -> String {
        match self {
            Self::Malformed { raw, .. } | Self::UnexpectedShape { raw, .. } => raw,
        }
    }
}
