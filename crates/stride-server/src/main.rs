//! `stride-server` binary

use anyhow::Context;
use std::sync::Arc;
use stride_core::{ArtifactStore, FsStore, MemoryStore, ThreatModeler};
use stride_llm::OpenAiGateway;
use stride_server::{logging, routes, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref(), cli.log_json)?;

    let config = cli.pipeline_config().context("loading configuration")?;
    let gateway = OpenAiGateway::new(config.gateway_config())
        .context("building model gateway (is OPENAI_API_KEY set?)")?;

    let store: Arc<dyn ArtifactStore> = if cli.memory_store {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FsStore::new(config.data_dir.clone()))
    };

    tracing::info!(
        model = %config.model,
        max_concurrency = config.max_concurrent_enrichments,
        backend = store.backend(),
        "starting stride-server"
    );

    let modeler = Arc::new(ThreatModeler::new(config, Arc::new(gateway), store)?);
    let (addr, server) = warp::serve(routes(modeler))
        .try_bind_with_graceful_shutdown(cli.bind, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .with_context(|| format!("binding {}", cli.bind))?;

    tracing::info!(%addr, "listening");
    server.await;
    tracing::info!("shut down");
    Ok(())
}
