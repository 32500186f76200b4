//! Analysis records
//!
//! One uploaded image, its extraction, and the threats accumulated for it so
//! far through incremental enrichment.

use crate::component::Extraction;
use crate::ids::{AnalysisId, ComponentId};
use crate::report::Report;
use crate::threat::ThreatRecord;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Registered, extraction not finished
    Pending,
    /// Extraction succeeded
    Extracted,
    /// Extraction failed; the extraction is an empty placeholder
    Degraded,
    /// Extraction failed, then the raw output was salvaged
    Repaired,
}

/// Stored source image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Storage key of the bytes
    pub key: String,
    /// Stable public reference, e.g. `/static/<id>.png`
    pub public_url: String,
    /// MIME type
    pub content_type: String,
    /// Original upload name, if known
    pub filename: Option<String>,
}

/// One end-to-end unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Analysis id
    pub id: AnalysisId,
    /// Source image
    pub source_image: ImageRef,
    /// Extracted components and graph
    pub extraction: Extraction,
    /// Lifecycle status
    pub status: AnalysisStatus,
    /// Raw model text kept when extraction output could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Incrementally enriched threats, keyed by component in first-call order
    #[serde(default)]
    pub incremental: IndexMap<ComponentId, Vec<ThreatRecord>>,
    /// Bumped whenever the content a report is built from changes
    #[serde(default)]
    pub revision: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    /// Create a pending analysis with an empty extraction
    #[must_use]
    pub fn pending(id: AnalysisId, source_image: ImageRef) -> Self {
        let extraction = Extraction::new(
            id,
            source_image.public_url.clone(),
            Vec::new(),
            crate::component::ComponentGraph::new(),
        );
        Self {
            id,
            source_image,
            extraction,
            status: AnalysisStatus::Pending,
            raw_output: None,
            incremental: IndexMap::new(),
            revision: 0,
            created_at: Utc::now(),
        }
    }

    /// Store the incremental records of one component
    ///
    /// A repeated call for the same component replaces its earlier records in
    /// place, so each component is counted once.
    pub fn record_component_threats(&mut self, component: ComponentId, threats: Vec<ThreatRecord>) {
        self.incremental.insert(component, threats);
        self.revision += 1;
    }

    /// Replace a degraded extraction with its repaired version
    pub fn mark_repaired(&mut self, extraction: Extraction) {
        self.extraction = extraction;
        self.status = AnalysisStatus::Repaired;
        self.raw_output = None;
        self.revision += 1;
    }

    /// Number of components enriched incrementally
    #[inline]
    #[must_use]
    pub fn incremental_components(&self) -> usize {
        self.incremental.len()
    }

    /// Report assembled from incremental calls, or `None` if there were none
    #[must_use]
    pub fn accumulated_report(&self) -> Option<Report> {
        if self.incremental.is_empty() {
            return None;
        }

        let threats = self.incremental.values().flatten().cloned().collect();
        Some(Report::new(
            self.id,
            self.incremental.len(),
            threats,
            self.extraction.graph.clone(),
        ))
    }
}
