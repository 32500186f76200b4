//! Error types for the STRIDE pipeline
//!
//! Provides error handling for:
//! - Registry lookups (unknown analyses and components)
//! - Extraction failures (gateway or unparsable model output)
//! - Storage collaborator failures
//! - Configuration and rendering

use std::path::PathBuf;
use stride_llm::{GatewayError, ParseError};
use stride_model::{AnalysisId, ComponentId};

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Referenced analysis does not exist
    #[error("analysis not found: {0}")]
    AnalysisNotFound(AnalysisId),

    /// Request references a component the analysis does not know
    #[error("component '{component}' is not part of analysis {analysis}")]
    UnknownComponent {
        analysis: AnalysisId,
        component: ComponentId,
    },

    /// Request is malformed
    #[error("invalid request: {0}")]
    Validation(String),

    /// External model call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Model output could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Storage collaborator failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Report could not be rendered
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Check if error means "not found"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AnalysisNotFound(_))
    }

    /// Check if error means "bad request"
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnknownComponent { .. } | Self::Validation(_))
    }

    /// Check if the caller is at fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_not_found() || self.is_validation()
    }
}

/// Why an extraction degraded to an empty result
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    /// Model call failed or timed out
    #[error("model call failed: {0}")]
    Gateway(#[from] GatewayError),

    /// Model replied with something that is not a component graph
    #[error("model output could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

impl ExtractError {
    /// Raw model text, when the failure was a parse failure
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Gateway(_) => None,
            Self::Parse(e) => Some(e.raw()),
        }
    }
}

/// Storage collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Key escapes the store root or is empty
    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),

    /// IO failure
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored document could not be (de)serialized
    #[error("serialization error on {key}: {message}")]
    Serialization { key: String, message: String },
}

impl StorageError {
    /// Create IO error for key
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    /// Create serialization error for key
    pub fn serialization(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Serialization {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("cannot parse config: {0}")]
    Parse(String),

    /// Values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Report rendering errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Report could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Layout parameters are unusable
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_classification() {
        let id = AnalysisId::new();
        assert!(PipelineError::AnalysisNotFound(id).is_not_found());
        assert!(PipelineError::AnalysisNotFound(id).is_client_error());

        let unknown = PipelineError::UnknownComponent {
            analysis: id,
            component: ComponentId::new("c9").unwrap(),
        };
        assert!(unknown.is_validation());
        assert!(!unknown.is_not_found());

        let gateway = PipelineError::from(GatewayError::EmptyResponse);
        assert!(!gateway.is_client_error());
    }

    #[test]
    fn extract_error_exposes_raw_output() {
        let err = ExtractError::from(ParseError::malformed("eof", "not json at all"));
        assert_eq!(err.raw_output(), Some("not json at all"));
        assert_eq!(ExtractError::from(GatewayError::EmptyResponse).raw_output(), None);
    }

    #[test]
    fn unknown_component_display() {
        let err = PipelineError::UnknownComponent {
            analysis: AnalysisId::new(),
            component: ComponentId::new("c9").unwrap(),
        };
        assert!(err.to_string().contains("component 'c9'"));
    }
}
