//! STRIDE Core - the threat-modeling pipeline
//!
//! Turns an architecture diagram into a STRIDE threat report:
//! - Extracts a component graph from the image via the model gateway
//! - Classifies each component against the fixed STRIDE rule table
//! - Enriches every (component, category) pair with a description and
//!   mitigation, never failing the batch
//! - Aggregates full or incremental reports and caches them per analysis
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stride_core::{FsStore, PipelineConfig, ThreatModeler};
//! use stride_llm::OpenAiGateway;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default().apply_env()?;
//! let gateway = Arc::new(OpenAiGateway::new(config.gateway_config())?);
//! let store = Arc::new(FsStore::new(&config.data_dir));
//! let modeler = ThreatModeler::new(config, gateway, store)?;
//!
//! let outcome = modeler.analyze_image(std::fs::read("diagram.png")?, Some("diagram.png")).await?;
//! let report = modeler.report(&outcome.analysis_id).await?;
//! println!("{} threats", report.threats.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Pipeline stages
pub mod aggregator;
pub mod classifier;
pub mod enricher;
pub mod extractor;
pub mod prompts;

// Collaborators and service
pub mod cache;
pub mod config;
pub mod error;
pub mod modeler;
pub mod registry;
pub mod render;
pub mod storage;

// Re-exports for convenience
pub use aggregator::ReportAggregator;
pub use cache::ReportCache;
pub use classifier::{ThreatClassifier, ThreatRule, DEFAULT_CATEGORIES, RULES};
pub use config::PipelineConfig;
pub use enricher::{EnrichmentReply, ThreatEnricher};
pub use error::{
    ConfigError, ExtractError, PipelineError, PipelineResult, RenderError, StorageError,
};
pub use extractor::{normalize_extraction, ComponentExtractor, ExtractionFailure, SourceImage};
pub use modeler::{IngestOutcome, ThreatModeler};
pub use registry::AnalysisStore;
pub use render::{JsonRenderer, ReportRenderer, TableRenderer, PAGE_BREAK};
pub use storage::{get_json, keys, put_json, ArtifactStore, FsStore, MemoryStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with STRIDE Core
    pub use crate::{
        ArtifactStore, FsStore, MemoryStore, PipelineConfig, PipelineError, PipelineResult,
        ReportRenderer, ThreatClassifier, ThreatModeler,
    };
    pub use stride_model::{
        Analysis, AnalysisId, Component, ComponentId, Extraction, Report, Severity,
        ThreatCategory, ThreatRecord,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
