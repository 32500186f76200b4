//! Diagram extraction
//!
//! Sends the diagram to the model, parses the reply and normalizes it into an
//! [`Extraction`]. A failed call or unparsable reply never aborts: the caller
//! gets an empty, error-annotated extraction alongside the cause, and that
//! placeholder is persisted like a successful result.
//!
//! Normalization policy:
//! - blank or missing ids get a fresh id; duplicate ids after the first
//!   occurrence get a fresh id too
//! - types are normalized, labels default to `"Unnamed"`, bad bboxes are
//!   `[0,0,0,0]`
//! - every component id is added to `graph.nodes`
//! - edges with an endpoint outside `graph.nodes` are dropped

use crate::config::PipelineConfig;
use crate::error::ExtractError;
use crate::prompts::{EXTRACTION_PROMPT, EXTRACTION_SYSTEM_PROMPT};
use crate::storage::{keys, put_json, ArtifactStore};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use stride_llm::{
    extension_for_mime, invoke_with_timeout, ImagePayload, ModelGateway, ModelRequest,
    ParseError, ResponseParser,
};
use stride_model::{AnalysisId, BoundingBox, Component, ComponentGraph, ComponentId, Extraction, ImageRef};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Uploaded image plus where it is stored and served
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Bytes and MIME type sent to the model
    pub payload: ImagePayload,
    /// Storage key and public reference
    pub reference: ImageRef,
}

/// Extraction that degraded to an empty placeholder
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    /// Empty extraction carrying the error text
    pub partial: Extraction,
    /// Why it degraded
    pub cause: ExtractError,
}

/// Orchestrates gateway and parser for the "describe this diagram" call
#[derive(Clone)]
pub struct ComponentExtractor {
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn ArtifactStore>,
    parser: ResponseParser,
    max_tokens: u32,
    timeout: Duration,
    static_prefix: String,
}

impl std::fmt::Debug for ComponentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentExtractor")
            .field("model", &self.gateway.model_name())
            .field("store", &self.store.backend())
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ComponentExtractor {
    /// Create extractor
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        store: Arc<dyn ArtifactStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            parser: ResponseParser::new(),
            max_tokens: config.extraction_max_tokens,
            timeout: config.call_timeout(),
            static_prefix: config.static_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Decide storage key, public URL and MIME type for an upload
    ///
    /// The extension comes from `filename` when it names an image type,
    /// otherwise from the sniffed MIME type.
    #[must_use]
    pub fn prepare_image(
        &self,
        analysis_id: AnalysisId,
        bytes: Vec<u8>,
        filename: Option<&str>,
    ) -> SourceImage {
        let payload = ImagePayload::new(bytes);
        let extension = filename
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| extension_for_mime(payload.mime()).to_string());

        let reference = ImageRef {
            key: keys::image(&analysis_id, &extension),
            public_url: format!("{}/{analysis_id}.{extension}", self.static_prefix),
            content_type: payload.mime().to_string(),
            filename: filename.map(str::to_string),
        };
        SourceImage { payload, reference }
    }

    /// Store the image, ask the model for the component graph, normalize it
    /// and persist the result
    ///
    /// Storage failures are logged and do not change the outcome.
    ///
    /// # Errors
    /// - [`ExtractionFailure`] holding the persisted placeholder when the
    ///   model call fails or its reply cannot be parsed
    pub async fn extract(
        &self,
        image: &SourceImage,
        analysis_id: AnalysisId,
    ) -> Result<Extraction, ExtractionFailure> {
        let image_url = image.reference.public_url.as_str();

        if let Err(e) = self
            .store
            .put_bytes(&image.reference.key, image.payload.bytes().to_vec())
            .await
        {
            tracing::warn!(analysis_id = %analysis_id, error = %e, "failed to store source image");
        }

        let request = ModelRequest::with_image(EXTRACTION_PROMPT, image.payload.clone())
            .system(EXTRACTION_SYSTEM_PROMPT)
            .max_tokens(self.max_tokens);

        let outcome = match invoke_with_timeout(self.gateway.as_ref(), request, self.timeout).await {
            Ok(raw) => self
                .parser
                .parse_object(&raw)
                .and_then(|map| normalize_extraction(map, &raw, analysis_id, image_url))
                .map_err(ExtractError::from),
            Err(e) => Err(ExtractError::from(e)),
        };

        match outcome {
            Ok(extraction) => {
                tracing::info!(
                    analysis_id = %analysis_id,
                    components = extraction.components_count(),
                    edges = extraction.graph.edges.len(),
                    "extracted component graph"
                );
                self.persist(&extraction).await;
                Ok(extraction)
            }
            Err(cause) => {
                let message = match &cause {
                    ExtractError::Parse(e) => format!("failed to parse JSON: {}", e.raw()),
                    ExtractError::Gateway(e) => e.to_string(),
                };
                tracing::warn!(analysis_id = %analysis_id, error = %cause, "extraction degraded to empty graph");
                let partial = Extraction::degraded(analysis_id, image_url, message);
                self.persist(&partial).await;
                if let Some(raw) = cause.raw_output() {
                    let key = keys::raw_output(&analysis_id);
                    if let Err(e) = self.store.put_bytes(&key, raw.as_bytes().to_vec()).await {
                        tracing::warn!(analysis_id = %analysis_id, error = %e, "failed to persist raw output");
                    }
                }
                Err(ExtractionFailure { partial, cause })
            }
        }
    }

    /// Second, more lenient parse of a reply that failed [`Self::extract`]
    ///
    /// Accepts an object embedded in prose. On success the repaired
    /// extraction replaces the persisted placeholder.
    ///
    /// # Errors
    /// - `ParseError` if no usable object can be recovered
    pub async fn repair(
        &self,
        raw: &str,
        analysis_id: AnalysisId,
        image_url: &str,
    ) -> Result<Extraction, ParseError> {
        let map = match self.parser.salvage(raw)? {
            Value::Object(map) => map,
            _ => return Err(ParseError::unexpected_shape("a JSON object", raw)),
        };
        let extraction = normalize_extraction(map, raw, analysis_id, image_url)?;
        tracing::info!(
            analysis_id = %analysis_id,
            components = extraction.components_count(),
            "repaired extraction from raw model output"
        );
        self.persist(&extraction).await;
        if let Err(e) = self.store.delete(&keys::raw_output(&analysis_id)).await {
            tracing::warn!(analysis_id = %analysis_id, error = %e, "failed to drop raw output");
        }
        Ok(extraction)
    }

    async fn persist(&self, extraction: &Extraction) {
        let key = keys::extraction(&extraction.analysis_id);
        if let Err(e) = put_json(self.store.as_ref(), &key, extraction).await {
            tracing::warn!(analysis_id = %extraction.analysis_id, error = %e, "failed to persist extraction");
        }
    }
}

/// Turn a decoded model reply into a validated [`Extraction`]
///
/// # Errors
/// - `ParseError::UnexpectedShape` if `components` is not an array or
///   `graph` is not an object
pub fn normalize_extraction(
    mut map: Map<String, Value>,
    raw: &str,
    analysis_id: AnalysisId,
    image_url: &str,
) -> Result<Extraction, ParseError> {
    let raw_components = match map.remove("components") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseError::unexpected_shape("`components` to be an array", raw)),
    };
    let raw_graph = match map.remove("graph") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(graph)) => graph,
        Some(_) => return Err(ParseError::unexpected_shape("`graph` to be an object", raw)),
    };

    let components = normalize_components(raw_components, analysis_id);

    let mut graph = ComponentGraph {
        nodes: id_list(raw_graph.get("nodes")),
        edges: edge_list(raw_graph.get("edges"), analysis_id),
    };
    graph.ensure_nodes(components.iter().map(Component::id));
    for (from, to) in graph.retain_valid_edges() {
        tracing::warn!(analysis_id = %analysis_id, from = %from, to = %to, "dropped edge to unknown node");
    }

    Ok(Extraction::new(analysis_id, image_url, components, graph))
}

fn normalize_components(items: Vec<Value>, analysis_id: AnalysisId) -> Vec<Component> {
    let mut seen = HashSet::new();
    let mut components = Vec::with_capacity(items.len());

    for item in items {
        let Value::Object(fields) = item else {
            tracing::warn!(analysis_id = %analysis_id, "skipped component that is not an object");
            continue;
        };

        let id = match fields.get("id").and_then(id_from_json) {
            Some(id) if seen.contains(&id) => {
                let fresh = ComponentId::fresh();
                tracing::warn!(analysis_id = %analysis_id, duplicate = %id, assigned = %fresh, "reassigned duplicate component id");
                fresh
            }
            Some(id) => id,
            None => ComponentId::fresh(),
        };
        seen.insert(id.clone());

        let label = fields.get("label").and_then(Value::as_str).unwrap_or_default();
        let component_type = fields.get("type").and_then(Value::as_str).unwrap_or_default();
        let bbox = BoundingBox::from_json(fields.get("bbox"));

        components.push(Component::new(id, label, component_type, bbox));
    }
    components
}

fn id_from_json(value: &Value) -> Option<ComponentId> {
    match value {
        Value::String(s) => ComponentId::new(s.as_str()).ok(),
        Value::Number(n) => ComponentId::new(n.to_string()).ok(),
        _ => None,
    }
}

fn id_list(value: Option<&Value>) -> Vec<ComponentId> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_from_json).collect())
        .unwrap_or_default()
}

fn edge_list(value: Option<&Value>, analysis_id: AnalysisId) -> Vec<(ComponentId, ComponentId)> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|edge| {
            let pair = match edge.as_array().map(Vec::as_slice) {
                Some([from, to]) => id_from_json(from).zip(id_from_json(to)),
                _ => None,
            };
            if pair.is_none() {
                tracing::warn!(analysis_id = %analysis_id, edge = %edge, "skipped malformed edge");
            }
            pair
        })
        .collect()
}
