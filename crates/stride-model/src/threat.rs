//! STRIDE threat categories and threat records

use crate::component::Component;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Description used when enrichment is unavailable
pub const FALLBACK_DESCRIPTION: &str = "description not available";

/// Mitigation used when enrichment is unavailable
pub const FALLBACK_MITIGATION: &str = "mitigation not available";

/// The six STRIDE categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatCategory {
    /// Pretending to be someone or something else
    Spoofing,
    /// Unauthorized modification of data or code
    Tampering,
    /// Denying an action without the system being able to prove otherwise
    Repudiation,
    /// Exposure of information to unauthorized parties
    #[serde(rename = "Information Disclosure")]
    InformationDisclosure,
    /// Degrading or denying service to legitimate users
    #[serde(rename = "Denial of Service")]
    DenialOfService,
    /// Gaining capabilities without authorization
    #[serde(rename = "Elevation of Privilege")]
    ElevationOfPrivilege,
}

impl ThreatCategory {
    /// All categories in STRIDE order
    pub const ALL: [Self; 6] = [
        Self::Spoofing,
        Self::Tampering,
        Self::Repudiation,
        Self::InformationDisclosure,
        Self::DenialOfService,
        Self::ElevationOfPrivilege,
    ];

    /// Display name, as used on the wire
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spoofing => "Spoofing",
            Self::Tampering => "Tampering",
            Self::Repudiation => "Repudiation",
            Self::InformationDisclosure => "Information Disclosure",
            Self::DenialOfService => "Denial of Service",
            Self::ElevationOfPrivilege => "Elevation of Privilege",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a category name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown STRIDE category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for ThreatCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Threat severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Needs attention before release
    High,
    /// Should be addressed
    Medium,
}

impl Severity {
    /// Display name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural-language risk description plus mitigation for one threat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Risk description
    pub description: String,
    /// Mitigation strategy
    pub mitigation: String,
}

impl Enrichment {
    /// Create enrichment, trimming both fields
    #[must_use]
    pub fn new(description: impl AsRef<str>, mitigation: impl AsRef<str>) -> Self {
        Self {
            description: description.as_ref().trim().to_string(),
            mitigation: mitigation.as_ref().trim().to_string(),
        }
    }

    /// The fixed pair returned when enrichment fails
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            description: FALLBACK_DESCRIPTION.to_string(),
            mitigation: FALLBACK_MITIGATION.to_string(),
        }
    }

    /// Whether this is the fallback pair
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.description == FALLBACK_DESCRIPTION && self.mitigation == FALLBACK_MITIGATION
    }
}

/// One threat for one (component, category) pair
///
/// Serialized shape:
/// `{title, component, threat_type, severity, description, mitigation}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRecord {
    /// `"<Category> on <Label>"`
    pub title: String,
    /// Component label
    pub component: String,
    /// STRIDE category
    pub threat_type: ThreatCategory,
    /// Mapped severity
    pub severity: Severity,
    /// Risk description
    pub description: String,
    /// Mitigation strategy
    pub mitigation: String,
}

impl ThreatRecord {
    /// Build record for a component
    #[must_use]
    pub fn new(
        component: &Component,
        threat_type: ThreatCategory,
        severity: Severity,
        enrichment: Enrichment,
    ) -> Self {
        Self {
            title: format!("{} on {}", threat_type, component.label()),
            component: component.label().to_string(),
            threat_type,
            severity,
            description: enrichment.description,
            mitigation: enrichment.mitigation,
        }
    }
}
