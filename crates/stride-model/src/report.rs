//! Aggregated threat report

use crate::component::ComponentGraph;
use crate::ids::AnalysisId;
use crate::threat::{Severity, ThreatRecord};
use serde::{Deserialize, Serialize};

/// Threat report for one analysis
///
/// `components_count` is the number of distinct components the report
/// covers; it is independent of `threats.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Owning analysis
    pub analysis_id: AnalysisId,
    /// Distinct components considered
    pub components_count: usize,
    /// Records in component-then-category order
    pub threats: Vec<ThreatRecord>,
    /// Diagram graph
    pub graph: ComponentGraph,
}

impl Report {
    /// Create report
    #[inline]
    #[must_use]
    pub fn new(
        analysis_id: AnalysisId,
        components_count: usize,
        threats: Vec<ThreatRecord>,
        graph: ComponentGraph,
    ) -> Self {
        Self {
            analysis_id,
            components_count,
            threats,
            graph,
        }
    }

    /// Number of records with the given severity
    #[must_use]
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.threats.iter().filter(|t| t.severity == severity).count()
    }

    /// Records for one component label
    pub fn threats_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a ThreatRecord> + 'a {
        self.threats.iter().filter(move |t| t.component == label)
    }
}
