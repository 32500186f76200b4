//! Testing utilities for the STRIDE workspace
//!
//! Gateway stubs and fixtures shared by integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stride_core::{MemoryStore, PipelineConfig, ThreatModeler};
use stride_llm::{GatewayError, ModelGateway, ModelRequest};
use stride_model::{BoundingBox, Component, ComponentId};

/// Extraction reply with a user, a web server and a database
pub const SAMPLE_EXTRACTION: &str = r#"```json
{
  "components": [
    {"id": "c1", "label": "Browser", "type": "user", "bbox": [10, 10, 80, 40]},
    {"id": "c2", "label": "Web Server", "type": "Web Server", "bbox": [150, 10, 120, 60]},
    {"id": "c3", "label": "Auth DB", "type": "database", "bbox": [0, 0, 0, 0]}
  ],
  "graph": {
    "nodes": ["c1", "c2", "c3"],
    "edges": [["c1", "c2"], ["c2", "c3"]]
  }
}
```"#;

/// Records the sample extraction yields: user 4 + web server 6 + database 4
pub const SAMPLE_THREAT_COUNT: usize = 14;

/// Smallest byte string sniffed as PNG
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Description the scripted gateway returns for a pair
#[must_use]
pub fn scripted_description(category: &str, label: &str) -> String {
    format!("{category} risk for {label}")
}

/// Mitigation the scripted gateway returns for a pair
#[must_use]
pub fn scripted_mitigation(category: &str, label: &str) -> String {
    format!("Mitigate {category} on {label}")
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

/// Deterministic gateway
///
/// Image requests get the extraction reply. Text requests get the first rule
/// whose needle occurs in the prompt, otherwise an enrichment object naming
/// the component and category found in the prompt.
#[derive(Debug)]
pub struct ScriptedGateway {
    extraction: String,
    rules: Vec<(String, String)>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new(extraction: impl Into<String>) -> Self {
        Self {
            extraction: extraction.into(),
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Gateway replying with [`SAMPLE_EXTRACTION`]
    #[must_use]
    pub fn sample() -> Self {
        Self::new(SAMPLE_EXTRACTION)
    }

    /// Reply `reply` to any text prompt containing `needle`
    #[must_use]
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn enrichment_reply(prompt: &str) -> String {
        let label = between(prompt, "the component \"", "\" (type=").unwrap_or("unknown");
        let category = between(prompt, "the threat \"", "\"").unwrap_or("unknown");
        json!({
            "description": scripted_description(category, label),
            "mitigation": scripted_mitigation(category, label),
        })
        .to_string()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.content.text().to_string();
        self.prompts.lock().push(prompt.clone());

        if request.content.image().is_some() {
            return Ok(self.extraction.clone());
        }
        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return Ok(reply.clone());
        }
        Ok(Self::enrichment_reply(&prompt))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Gateway that fails every call
#[derive(Debug)]
pub struct FailingGateway {
    error: GatewayError,
    calls: AtomicUsize,
}

impl FailingGateway {
    #[must_use]
    pub fn new(error: GatewayError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingGateway {
    fn default() -> Self {
        Self::new(GatewayError::Status {
            status: 503,
            body: "service unavailable".into(),
        })
    }
}

#[async_trait]
impl ModelGateway for FailingGateway {
    async fn invoke(&self, _request: ModelRequest) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Wraps a gateway with per-call delay and tracks concurrency
///
/// Delays vary by call number so completion order differs from issue order.
#[derive(Debug)]
pub struct SlowGateway<G> {
    inner: G,
    max_delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl<G: ModelGateway> SlowGateway<G> {
    #[must_use]
    pub fn new(inner: G, max_delay: Duration) -> Self {
        Self {
            inner,
            max_delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Highest number of calls observed in flight at once
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn delay_for(&self, call: usize) -> Duration {
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX).max(1);
        let step = u64::try_from(call).unwrap_or_default().wrapping_mul(7919) % max_ms;
        Duration::from_millis(max_ms - step)
    }
}

#[async_trait]
impl<G: ModelGateway> ModelGateway for SlowGateway<G> {
    async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay_for(call)).await;
        let outcome = self.inner.invoke(request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Component with the given id, label and type
#[must_use]
pub fn component(id: &str, label: &str, component_type: &str) -> Component {
    Component::new(
        ComponentId::new(id).unwrap(),
        label,
        component_type,
        BoundingBox::UNKNOWN,
    )
}

/// Config with short timeouts for tests
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_model("test-model")
        .with_call_timeout(Duration::from_secs(5))
}

/// Modeler over an in-memory store
pub fn setup_modeler(gateway: Arc<dyn ModelGateway>) -> ThreatModeler {
    setup_modeler_with(test_config(), gateway)
}

/// Modeler with explicit config over an in-memory store
pub fn setup_modeler_with(config: PipelineConfig, gateway: Arc<dyn ModelGateway>) -> ThreatModeler {
    ThreatModeler::new(config, gateway, Arc::new(MemoryStore::new())).unwrap()
}

/// Modeler backed by a [`ScriptedGateway::sample`]
#[must_use]
pub fn setup_scripted_modeler() -> (ThreatModeler, Arc<ScriptedGateway>) {
    let gateway = Arc::new(ScriptedGateway::sample());
    let modeler = setup_modeler(gateway.clone());
    (modeler, gateway)
}
