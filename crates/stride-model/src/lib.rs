//! STRIDE Model - typed records for the threat-modeling pipeline
//!
//! Everything the pipeline passes between stages:
//! - Components and the component graph extracted from a diagram
//! - STRIDE categories, severities and threat records
//! - Reports and analyses
//!
//! # Example
//!
//! ```rust
//! use stride_model::{BoundingBox, Component, ComponentId};
//!
//! let db = Component::new(ComponentId::new("c1").unwrap(), "Auth DB", "Database", BoundingBox::UNKNOWN);
//! assert_eq!(db.component_type(), "database");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod analysis;
pub mod component;
pub mod ids;
pub mod report;
pub mod threat;

pub use analysis::{Analysis, AnalysisStatus, ImageRef};
pub use component::{
    normalize_type, BoundingBox, Component, ComponentGraph, Extraction, DEFAULT_COMPONENT_TYPE,
    UNNAMED_LABEL,
};
pub use ids::{AnalysisId, ComponentId, IdError};
pub use report::Report;
pub use threat::{
    Enrichment, Severity, ThreatCategory, ThreatRecord, UnknownCategory, FALLBACK_DESCRIPTION,
    FALLBACK_MITIGATION,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
