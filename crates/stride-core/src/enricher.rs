//! Per-threat enrichment
//!
//! Asks the model for a description and mitigation of one (category,
//! component) pair. [`ThreatEnricher::enrich`] never fails: any gateway or
//! parse problem yields [`Enrichment::fallback`].
//!
//! All enrichments issued through one enricher share a semaphore, so the
//! number of calls in flight stays under the configured cap across every
//! concurrent request.

use crate::config::PipelineConfig;
use crate::error::ExtractError;
use crate::prompts::enrichment_prompt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stride_llm::{invoke_with_timeout, GatewayError, ModelGateway, ModelRequest, ResponseParser};
use stride_model::{Component, Enrichment, ThreatCategory};
use tokio::sync::Semaphore;

/// Reply shape of an enrichment call; missing fields are empty
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichmentReply {
    /// Risk description
    pub description: String,
    /// Mitigation strategy
    pub mitigation: String,
}

impl From<EnrichmentReply> for Enrichment {
    fn from(reply: EnrichmentReply) -> Self {
        Self::new(reply.description, reply.mitigation)
    }
}

/// Orchestrates gateway and parser for the "describe this threat" call
#[derive(Clone)]
pub struct ThreatEnricher {
    gateway: Arc<dyn ModelGateway>,
    parser: ResponseParser,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for ThreatEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreatEnricher")
            .field("model", &self.gateway.model_name())
            .field("max_concurrency", &self.max_concurrency)
            .field("available_permits", &self.permits.available_permits())
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl ThreatEnricher {
    /// Create enricher
    #[must_use]
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &PipelineConfig) -> Self {
        let max_concurrency = config.max_concurrent_enrichments.max(1);
        Self {
            gateway,
            parser: ResponseParser::new(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            max_tokens: config.enrichment_max_tokens,
            timeout: config.call_timeout(),
        }
    }

    /// Concurrency cap
    #[inline]
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Description and mitigation for one threat, or the fallback pair
    pub async fn enrich(&self, category: ThreatCategory, component: &Component) -> Enrichment {
        match self.try_enrich(category, component).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                tracing::warn!(
                    component = component.label(),
                    category = %category,
                    error = %e,
                    "enrichment failed, using fallback text"
                );
                Enrichment::fallback()
            }
        }
    }

    /// Same call as [`Self::enrich`] without the fallback
    ///
    /// # Errors
    /// - `ExtractError::Gateway` if the call fails, times out, or the
    ///   semaphore has been closed
    /// - `ExtractError::Parse` if the reply is not an object
    pub async fn try_enrich(
        &self,
        category: ThreatCategory,
        component: &Component,
    ) -> Result<Enrichment, ExtractError> {
        let request = ModelRequest::text(enrichment_prompt(
            category,
            component.label(),
            component.component_type(),
        ))
        .max_tokens(self.max_tokens);

        let raw = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| GatewayError::Unavailable("enrichment pool closed".into()))?;
            let start = Instant::now();
            let raw = invoke_with_timeout(self.gateway.as_ref(), request, self.timeout).await?;
            tracing::debug!(
                component = component.label(),
                category = %category,
                elapsed_ms = start.elapsed().as_millis(),
                "enrichment call completed"
            );
            raw
        };

        let reply: EnrichmentReply = self.parser.parse_as(&raw)?;
        Ok(reply.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use stride_model::{BoundingBox, ComponentId};

    struct Fixed(Result<String, GatewayError>);

    #[async_trait]
    impl ModelGateway for Fixed {
        async fn invoke(&self, _request: ModelRequest) -> Result<String, GatewayError> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct Hang;

    #[async_trait]
    impl ModelGateway for Hang {
        async fn invoke(&self, _request: ModelRequest) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("{}".into())
        }

        fn model_name(&self) -> &str {
            "hang"
        }
    }

    fn enricher(reply: Result<&str, GatewayError>) -> ThreatEnricher {
        ThreatEnricher::new(
            Arc::new(Fixed(reply.map(str::to_string))),
            &PipelineConfig::default(),
        )
    }

    fn auth_db() -> Component {
        Component::new(ComponentId::new("c1").unwrap(), "Auth DB", "database", BoundingBox::UNKNOWN)
    }

    #[tokio::test]
    async fn fenced_reply_is_trimmed() {
        let enricher = enricher(Ok("```json\n{\"description\": \"  Leaks rows \", \"mitigation\": \"Encrypt\\n\"}\n```"));
        let enrichment = enricher.enrich(ThreatCategory::InformationDisclosure, &auth_db()).await;
        assert_eq!(enrichment, Enrichment::new("Leaks rows", "Encrypt"));
    }

    #[tokio::test]
    async fn missing_field_is_empty() {
        let enricher = enricher(Ok("{\"description\": \"only this\"}"));
        let enrichment = enricher.enrich(ThreatCategory::Tampering, &auth_db()).await;
        assert_eq!(enrichment.description, "only this");
        assert_eq!(enrichment.mitigation, "");
    }

    #[tokio::test]
    async fn failures_yield_fallback() {
        for reply in [
            Err(GatewayError::EmptyResponse),
            Ok("not json"),
            Ok("[1, 2]"),
            Ok("{\"description\": 7}"),
        ] {
            let enrichment = enricher(reply).enrich(ThreatCategory::Spoofing, &auth_db()).await;
            assert!(enrichment.is_fallback());
        }
    }

    #[tokio::test]
    async fn try_enrich_reports_cause() {
        let err = enricher(Ok("nope"))
            .try_enrich(ThreatCategory::Spoofing, &auth_db())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn timeout_yields_fallback() {
        let config = PipelineConfig::default();
        let mut enricher = ThreatEnricher::new(Arc::new(Hang), &config);
        enricher.timeout = Duration::from_millis(20);

        let enrichment = enricher.enrich(ThreatCategory::DenialOfService, &auth_db()).await;
        assert!(enrichment.is_fallback());
        assert_eq!(enricher.permits.available_permits(), enricher.max_concurrency());
    }
}
