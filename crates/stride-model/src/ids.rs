//! Identifiers for analyses and diagram components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error parsing an identifier from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Analysis id is not a UUID
    #[error("invalid analysis id '{0}'")]
    InvalidAnalysisId(String),

    /// Component id is empty after trimming
    #[error("component id must not be empty")]
    EmptyComponentId,
}

/// Unique analysis identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(pub Uuid);

impl AnalysisId {
    /// Generate new analysis ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnalysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnalysisId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdError::InvalidAnalysisId(s.to_string()))
    }
}

/// Component identifier, unique within one analysis
///
/// Ids come from the model output (`"c1"`, `"db"`) or are generated with
/// [`ComponentId::fresh`] when the model omitted them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create from a non-empty string
    ///
    /// # Errors
    /// - `IdError::EmptyComponentId` if `id` is blank
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(IdError::EmptyComponentId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh unique id
    #[inline]
    #[must_use]
    pub fn fresh() -> Self {
        Self(format!("c-{}", Uuid::new_v4().simple()))
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ComponentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
