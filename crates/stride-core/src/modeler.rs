//! Threat modeling service
//!
//! Owns the registry, the report cache and the pipeline stages, and exposes
//! the operations the transport layer calls:
//! - ingest an image and extract its component graph
//! - repair a degraded extraction from the raw model output
//! - fresh full reports, incremental per-component enrichment, and the
//!   cached/assembled report

use crate::aggregator::ReportAggregator;
use crate::cache::ReportCache;
use crate::classifier::ThreatClassifier;
use crate::config::PipelineConfig;
use crate::enricher::ThreatEnricher;
use crate::error::{PipelineError, PipelineResult};
use crate::extractor::ComponentExtractor;
use crate::registry::AnalysisStore;
use crate::render::ReportRenderer;
use crate::storage::{get_json, keys, put_json, validate_key, ArtifactStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stride_llm::{sniff_image_mime, ModelGateway};
use stride_model::{
    Analysis, AnalysisId, AnalysisStatus, ComponentId, Extraction, ImageRef, Report, ThreatRecord,
};

/// Result of ingesting one image
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// New analysis id
    pub analysis_id: AnalysisId,
    /// Status after extraction
    pub status: AnalysisStatus,
    /// Extraction as stored
    pub extraction: Extraction,
}

impl IngestOutcome {
    /// Error text of a degraded extraction
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.extraction.error.as_deref()
    }
}

/// The analysis pipeline behind the HTTP surface
#[derive(Debug)]
pub struct ThreatModeler {
    config: PipelineConfig,
    registry: AnalysisStore,
    store: Arc<dyn ArtifactStore>,
    extractor: ComponentExtractor,
    aggregator: ReportAggregator,
    cache: ReportCache,
}

impl ThreatModeler {
    /// Create modeler
    ///
    /// # Errors
    /// - `PipelineError::Config` if the configuration is inconsistent
    pub fn new(
        config: PipelineConfig,
        gateway: Arc<dyn ModelGateway>,
        store: Arc<dyn ArtifactStore>,
    ) -> PipelineResult<Self> {
        config.validate()?;

        let extractor = ComponentExtractor::new(Arc::clone(&gateway), Arc::clone(&store), &config);
        let aggregator = ReportAggregator::new(
            ThreatClassifier::new(),
            ThreatEnricher::new(gateway, &config),
        );
        let cache = match config.report_cache_ttl_secs {
            Some(ttl) => ReportCache::with_ttl(config.report_cache_capacity, Duration::from_secs(ttl)),
            None => ReportCache::new(config.report_cache_capacity),
        };

        tracing::info!(
            model = %config.model,
            store = store.backend(),
            max_concurrency = config.max_concurrent_enrichments,
            "threat modeler ready"
        );

        Ok(Self {
            config,
            registry: AnalysisStore::new(),
            store,
            extractor,
            aggregator,
            cache,
        })
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get analysis registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &AnalysisStore {
        &self.registry
    }

    /// Get artifact store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Get report cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Get aggregator
    #[inline]
    #[must_use]
    pub fn aggregator(&self) -> &ReportAggregator {
        &self.aggregator
    }

    /// Register an upload and extract its component graph
    ///
    /// Extraction failures do not fail the call: the analysis is registered
    /// as [`AnalysisStatus::Degraded`] with the raw model output kept for
    /// [`Self::repair`].
    ///
    /// # Errors
    /// - `PipelineError::Validation` if the upload is empty
    pub async fn analyze_image(
        &self,
        bytes: Vec<u8>,
        filename: Option<&str>,
    ) -> PipelineResult<IngestOutcome> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation("uploaded image is empty".into()));
        }

        let analysis_id = AnalysisId::new();
        let image = self.extractor.prepare_image(analysis_id, bytes, filename);
        self.registry
            .create(Analysis::pending(analysis_id, image.reference.clone()));
        tracing::info!(analysis_id = %analysis_id, filename, "analysis created");

        let (extraction, status, raw_output) = match self.extractor.extract(&image, analysis_id).await {
            Ok(extraction) => (extraction, AnalysisStatus::Extracted, None),
            Err(failure) => {
                let raw = failure.cause.raw_output().map(str::to_string);
                (failure.partial, AnalysisStatus::Degraded, raw)
            }
        };

        let stored = extraction.clone();
        self.registry.mutate(&analysis_id, move |analysis| {
            analysis.extraction = stored;
            analysis.status = status;
            analysis.raw_output = raw_output;
        })?;

        Ok(IngestOutcome {
            analysis_id,
            status,
            extraction,
        })
    }

    /// Re-parse the raw output of a degraded extraction
    ///
    /// Returns `Ok(None)` when there is nothing to repair.
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    /// - `PipelineError::Parse` if the raw output still cannot be used
    pub async fn repair(&self, id: &AnalysisId) -> PipelineResult<Option<Extraction>> {
        let analysis = self.load_analysis(id).await?;
        let Some(raw) = analysis.raw_output else {
            return Ok(None);
        };

        let extraction = self
            .extractor
            .repair(&raw, *id, &analysis.source_image.public_url)
            .await?;

        let stored = extraction.clone();
        self.registry
            .mutate(id, move |analysis| analysis.mark_repaired(stored))?;
        self.cache.invalidate(id).await;
        // A report persisted while degraded describes the empty placeholder.
        self.store.delete(&keys::report(id)).await?;

        Ok(Some(extraction))
    }

    /// Snapshot of an analysis
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub async fn analysis(&self, id: &AnalysisId) -> PipelineResult<Analysis> {
        self.load_analysis(id).await
    }

    /// Extraction document of an analysis
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub async fn extraction(&self, id: &AnalysisId) -> PipelineResult<Extraction> {
        Ok(self.load_analysis(id).await?.extraction)
    }

    /// Fresh full report; never cached or persisted
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    pub async fn stride_report(&self, id: &AnalysisId) -> PipelineResult<Report> {
        let analysis = self.load_analysis(id).await?;
        Ok(self.aggregator.generate_full(&analysis.extraction).await)
    }

    /// Enrich one component and add its records to the analysis
    ///
    /// The stored component is used, whatever fields the caller sent. A
    /// repeated call replaces the component's earlier records.
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    /// - `PipelineError::UnknownComponent` if the analysis has no such
    ///   component
    pub async fn enrich_component(
        &self,
        id: &AnalysisId,
        component_id: &ComponentId,
    ) -> PipelineResult<Vec<ThreatRecord>> {
        let analysis = self.load_analysis(id).await?;
        let component = analysis
            .extraction
            .component(component_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownComponent {
                analysis: *id,
                component: component_id.clone(),
            })?;

        let records = self.aggregator.generate_for_component(&component).await;

        let appended = records.clone();
        let total = self.registry.mutate(id, move |analysis| {
            analysis.record_component_threats(component_id.clone(), appended);
            analysis.incremental_components()
        })?;
        self.cache.invalidate(id).await;

        tracing::info!(
            analysis_id = %id,
            component = %component_id,
            threats = records.len(),
            enriched_components = total,
            "component enriched"
        );
        Ok(records)
    }

    /// Report for download
    ///
    /// Incremental records take precedence; otherwise the cached, then the
    /// persisted report is reused, and a full report is generated only when
    /// neither exists. The result is persisted and cached under the analysis
    /// revision it was built from, so a report that raced an incremental call
    /// is never served afterwards.
    ///
    /// # Errors
    /// - `PipelineError::AnalysisNotFound` if the id is unknown
    /// - `PipelineError::Storage` if a persisted report is corrupt
    pub async fn report(&self, id: &AnalysisId) -> PipelineResult<Arc<Report>> {
        let analysis = self.load_analysis(id).await?;
        self.cache
            .try_get_or_insert_with(*id, analysis.revision, || self.build_report(analysis))
            .await
    }

    async fn build_report(&self, analysis: Analysis) -> PipelineResult<(u64, Report)> {
        let id = analysis.id;
        let key = keys::report(&id);
        let mut revision = analysis.revision;

        let mut report = match analysis.accumulated_report() {
            Some(report) => report,
            None => match get_json::<Report>(self.store.as_ref(), &key).await? {
                Some(stored) => stored,
                None => self.aggregator.generate_full(&analysis.extraction).await,
            },
        };

        // Incremental records may have landed while the full report ran.
        let latest = self.registry.get(&id)?;
        if latest.revision != revision {
            if let Some(accumulated) = latest.accumulated_report() {
                tracing::debug!(analysis_id = %id, "report superseded by incremental records");
                report = accumulated;
                revision = latest.revision;
            }
        }

        if self.registry.revision(&id)? == revision {
            if let Err(e) = put_json(self.store.as_ref(), &key, &report).await {
                tracing::warn!(analysis_id = %id, error = %e, "failed to persist report");
            }
            // Changed between the check and the write: drop what was written.
            if self.registry.revision(&id)? != revision {
                if let Err(e) = self.store.delete(&key).await {
                    tracing::warn!(analysis_id = %id, error = %e, "failed to drop stale report");
                }
            }
        }

        Ok((revision, report))
    }

    /// Render the download report
    ///
    /// # Errors
    /// - any error of [`Self::report`]
    /// - `PipelineError::Render` if the renderer fails
    pub async fn render_report(
        &self,
        id: &AnalysisId,
        renderer: &dyn ReportRenderer,
    ) -> PipelineResult<Vec<u8>> {
        let report = self.report(id).await?;
        Ok(renderer.render(&report)?)
    }

    /// Stored image bytes and MIME type by public file name
    ///
    /// # Errors
    /// - `PipelineError::Storage` on backend failure
    pub async fn image(&self, file_name: &str) -> PipelineResult<Option<(Vec<u8>, &'static str)>> {
        let key = keys::public_file(file_name);
        if file_name.contains('/') || validate_key(&key).is_err() {
            return Ok(None);
        }
        Ok(self
            .store
            .get_bytes(&key)
            .await?
            .map(|bytes| {
                let mime = sniff_image_mime(&bytes);
                (bytes, mime)
            }))
    }

    /// Registry lookup, falling back to a persisted extraction
    async fn load_analysis(&self, id: &AnalysisId) -> PipelineResult<Analysis> {
        match self.registry.get(id) {
            Ok(analysis) => return Ok(analysis),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }

        let stored: Option<Extraction> = get_json(self.store.as_ref(), &keys::extraction(id)).await?;
        let Some(extraction) = stored else {
            return Err(PipelineError::AnalysisNotFound(*id));
        };

        let file_name = extraction
            .image_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let content_type = match file_name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "image/png",
        };
        let image = ImageRef {
            key: keys::public_file(&file_name),
            public_url: extraction.image_url.clone(),
            content_type: content_type.to_string(),
            filename: None,
        };

        let mut analysis = Analysis::pending(*id, image);
        if extraction.is_degraded() {
            analysis.status = AnalysisStatus::Degraded;
            analysis.raw_output = self
                .store
                .get_bytes(&keys::raw_output(id))
                .await?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        } else {
            analysis.status = AnalysisStatus::Extracted;
        }
        analysis.extraction = extraction;

        tracing::info!(analysis_id = %id, "restored analysis from storage");
        self.registry.create(analysis.clone());
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use stride_llm::{GatewayError, ModelRequest};

    const EXTRACTION: &str = r#"{"components": [
        {"id": "c1", "label": "Auth DB", "type": "database", "bbox": [0, 0, 0, 0]},
        {"id": "c2", "label": "Web", "type": "Web Server", "bbox": [10, 10, 50, 20]}
    ], "graph": {"nodes": ["c1", "c2"], "edges": [["c2", "c1"]]}}"#;

    struct Canned(&'static str);

    #[async_trait]
    impl ModelGateway for Canned {
        async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError> {
            if request.content.image().is_some() {
                Ok(self.0.to_string())
            } else {
                Ok(r#"{"description": "risk", "mitigation": "fix"}"#.to_string())
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn modeler(reply: &'static str) -> ThreatModeler {
        ThreatModeler::new(
            PipelineConfig::default(),
            Arc::new(Canned(reply)),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G'];

    #[tokio::test]
    async fn ingest_registers_extraction() {
        let modeler = modeler(EXTRACTION);
        let outcome = modeler.analyze_image(PNG.to_vec(), Some("arch.png")).await.unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Extracted);
        assert!(outcome.error().is_none());
        let analysis = modeler.analysis(&outcome.analysis_id).await.unwrap();
        assert_eq!(analysis.extraction.components_count(), 2);
        assert_eq!(modeler.registry().len(), 1);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let err = modeler(EXTRACTION).analyze_image(Vec::new(), None).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn degraded_ingest_can_be_repaired() {
        let modeler = modeler("Sure! {\"components\": [{\"id\": \"c1\", \"label\": \"API\", \"type\": \"api_gateway\"}]} Done.");
        let outcome = modeler.analyze_image(PNG.to_vec(), None).await.unwrap();
        assert_eq!(outcome.status, AnalysisStatus::Degraded);
        assert!(outcome.error().unwrap().contains("Sure!"));

        let repaired = modeler.repair(&outcome.analysis_id).await.unwrap().unwrap();
        assert_eq!(repaired.components_count(), 1);

        let analysis = modeler.analysis(&outcome.analysis_id).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Repaired);
        assert!(modeler.repair(&outcome.analysis_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repair_drops_report_of_placeholder() {
        let modeler = modeler("Sure! {\"components\": [{\"id\": \"c1\", \"label\": \"API\", \"type\": \"api_gateway\"}]} Done.");
        let id = modeler.analyze_image(PNG.to_vec(), None).await.unwrap().analysis_id;

        let empty = modeler.report(&id).await.unwrap();
        assert_eq!(empty.components_count, 0);
        assert!(modeler.store().exists(&keys::report(&id)).await.unwrap());

        modeler.repair(&id).await.unwrap().unwrap();
        assert!(!modeler.store().exists(&keys::report(&id)).await.unwrap());
        assert!(!modeler.store().exists(&keys::raw_output(&id)).await.unwrap());

        let report = modeler.report(&id).await.unwrap();
        assert_eq!(report.components_count, 1);
        assert_eq!(report.threats.len(), 4);
    }

    #[tokio::test]
    async fn unknown_component_is_rejected() {
        let modeler = modeler(EXTRACTION);
        let outcome = modeler.analyze_image(PNG.to_vec(), None).await.unwrap();

        let err = modeler
            .enrich_component(&outcome.analysis_id, &ComponentId::new("c9").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownComponent { .. }));
    }

    #[tokio::test]
    async fn incremental_call_invalidates_cached_report() {
        let modeler = modeler(EXTRACTION);
        let id = modeler.analyze_image(PNG.to_vec(), None).await.unwrap().analysis_id;

        let full = modeler.report(&id).await.unwrap();
        assert_eq!(full.components_count, 2);
        assert_eq!(full.threats.len(), 4 + 6);

        modeler.enrich_component(&id, &ComponentId::new("c1").unwrap()).await.unwrap();
        let report = modeler.report(&id).await.unwrap();
        assert_eq!(report.components_count, 1);
        assert_eq!(report.threats.len(), 4);
        assert!(modeler.store().exists(&keys::report(&id)).await.unwrap());
    }

    #[tokio::test]
    async fn missing_analysis_is_not_found() {
        let modeler = modeler(EXTRACTION);
        let err = modeler.report(&AnalysisId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn stored_image_is_served() {
        let modeler = modeler(EXTRACTION);
        let outcome = modeler.analyze_image(PNG.to_vec(), None).await.unwrap();
        let name = format!("{}.png", outcome.analysis_id);

        let (bytes, mime) = modeler.image(&name).await.unwrap().unwrap();
        assert_eq!(bytes, PNG);
        assert_eq!(mime, "image/png");
        assert!(modeler.image("../secret").await.unwrap().is_none());
    }
}
