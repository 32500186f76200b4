//! Report aggregation
//!
//! Classifies components and enriches every resulting category. Enrichment
//! futures are driven together and gated by the enricher's semaphore;
//! `join_all` yields results in input order, so records always come out in
//! component-then-category order whatever the completion order was.

use crate::classifier::ThreatClassifier;
use crate::enricher::ThreatEnricher;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant;
use stride_model::{Analysis, Component, Extraction, Report, ThreatRecord};

/// Builds threat records and reports
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    classifier: ThreatClassifier,
    enricher: ThreatEnricher,
}

impl ReportAggregator {
    /// Create aggregator
    #[inline]
    #[must_use]
    pub fn new(classifier: ThreatClassifier, enricher: ThreatEnricher) -> Self {
        Self {
            classifier,
            enricher,
        }
    }

    /// Get classifier
    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &ThreatClassifier {
        &self.classifier
    }

    /// Get enricher
    #[inline]
    #[must_use]
    pub fn enricher(&self) -> &ThreatEnricher {
        &self.enricher
    }

    /// One record per applicable category of one component, in the
    /// classifier's declared order
    pub async fn generate_for_component(&self, component: &Component) -> Vec<ThreatRecord> {
        let categories = self.classifier.classify(component.component_type());

        join_all(categories.iter().map(|&category| async move {
            let enrichment = self.enricher.enrich(category, component).await;
            ThreatRecord::new(
                component,
                category,
                self.classifier.severity_of(category),
                enrichment,
            )
        }))
        .await
    }

    /// Full report over every component in discovery order
    pub async fn generate_full(&self, extraction: &Extraction) -> Report {
        let start = Instant::now();

        let per_component = join_all(
            extraction
                .components
                .iter()
                .map(|component| self.generate_for_component(component)),
        )
        .await;
        let threats: Vec<ThreatRecord> = per_component.into_iter().flatten().collect();

        let components_count = extraction
            .components
            .iter()
            .map(Component::id)
            .collect::<HashSet<_>>()
            .len();

        tracing::info!(
            analysis_id = %extraction.analysis_id,
            components = components_count,
            threats = threats.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "generated full report"
        );

        Report::new(
            extraction.analysis_id,
            components_count,
            threats,
            extraction.graph.clone(),
        )
    }

    /// Report from accumulated incremental calls, or a full run when none
    /// were made
    pub async fn assemble(&self, analysis: &Analysis) -> Report {
        match analysis.accumulated_report() {
            Some(report) => report,
            None => self.generate_full(&analysis.extraction).await,
        }
    }
}
