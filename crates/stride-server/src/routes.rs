//! HTTP routes
//!
//! Thin adapters from request shapes to [`ThreatModeler`] calls. Every
//! failure is rendered by [`handle_rejection`] as `{"error": "..."}`.

use crate::error::{handle_rejection, reject, ApiError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use stride_core::{JsonRenderer, ReportRenderer, TableRenderer, ThreatModeler};
use stride_model::{AnalysisId, AnalysisStatus, ComponentId, ThreatRecord};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::Response;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Frontend origin allowed by CORS
pub const FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Query of `POST /api/upload`
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// Original file name, used for the stored extension
    pub filename: Option<String>,
}

/// Body of `POST /api/stride/component`
#[derive(Debug, Deserialize)]
pub struct ComponentRequest {
    /// Owning analysis
    pub analysis_id: String,
    /// Component reference; only `id` is used
    pub component: ComponentRef,
}

/// Component reference sent by the client
#[derive(Debug, Deserialize)]
pub struct ComponentRef {
    /// Component id
    pub id: String,
}

/// Reply of `POST /api/stride/component`
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentThreats {
    /// Records for the component
    pub threats: Vec<ThreatRecord>,
}

fn with_modeler(
    modeler: Arc<ThreatModeler>,
) -> impl Filter<Extract = (Arc<ThreatModeler>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&modeler))
}

fn parse_analysis_id(raw: &str) -> Result<AnalysisId, Rejection> {
    AnalysisId::from_str(raw).map_err(|e| reject(ApiError::BadRequest(e.to_string())))
}

fn bytes_reply(
    bytes: Vec<u8>,
    content_type: &str,
    disposition: Option<String>,
) -> Result<Response<Vec<u8>>, Rejection> {
    let mut builder = Response::builder().header(CONTENT_TYPE, content_type);
    if let Some(disposition) = disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(bytes)
        .map_err(|e| reject(ApiError::Internal(e.to_string())))
}

/// All routes with CORS, tracing and error rendering
pub fn routes(
    modeler: Arc<ThreatModeler>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let upload = warp::path!("api" / "upload")
        .and(warp::post())
        .and(warp::query::<UploadQuery>())
        .and(warp::body::content_length_limit(MAX_UPLOAD_BYTES))
        .and(warp::body::bytes())
        .and(with_modeler(modeler.clone()))
        .and_then(upload);

    let analysis = warp::path!("api" / "analysis" / String)
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(get_analysis);

    let stride = warp::path!("api" / "stride" / String)
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(get_stride);

    let component = warp::path!("api" / "stride" / "component")
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json())
        .and(with_modeler(modeler.clone()))
        .and_then(post_component);

    let report = warp::path!("api" / "report" / String)
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(get_report);

    let download = warp::path!("api" / "report" / String / "download")
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(download_report);

    let table = warp::path!("api" / "report" / String / "table")
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(table_report);

    let image = warp::path!("static" / String)
        .and(warp::get())
        .and(with_modeler(modeler.clone()))
        .and_then(get_image);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_modeler(modeler))
        .map(|modeler: Arc<ThreatModeler>| {
            warp::reply::json(&json!({
                "status": "ok",
                "version": crate::VERSION,
                "analyses": modeler.registry().len(),
            }))
        });

    let cors = warp::cors()
        .allow_origin(FRONTEND_ORIGIN)
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    upload
        .or(analysis)
        .or(stride)
        .or(component)
        .or(report)
        .or(download)
        .or(table)
        .or(image)
        .or(health)
        .with(cors)
        .with(warp::trace::request())
        .recover(handle_rejection)
}

async fn upload(
    query: UploadQuery,
    body: Bytes,
    modeler: Arc<ThreatModeler>,
) -> Result<impl Reply, Rejection> {
    let outcome = modeler
        .analyze_image(body.to_vec(), query.filename.as_deref())
        .await
        .map_err(reject)?;
    let analysis_id = outcome.analysis_id;

    let mut error = outcome.error().map(str::to_string);
    if outcome.status == AnalysisStatus::Degraded {
        match modeler.repair(&analysis_id).await {
            Ok(Some(_)) => error = None,
            Ok(None) => {}
            Err(e) => tracing::warn!(analysis_id = %analysis_id, error = %e, "repair failed"),
        }
    }

    let body = match error {
        None => json!({"analysis_id": analysis_id, "message": "analysis complete"}),
        Some(error) => json!({"analysis_id": analysis_id, "error": error}),
    };
    Ok(warp::reply::json(&body))
}

async fn get_analysis(id: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&id)?;
    let extraction = modeler.extraction(&id).await.map_err(reject)?;
    Ok(warp::reply::json(&extraction))
}

async fn get_stride(id: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&id)?;
    let report = modeler.stride_report(&id).await.map_err(reject)?;
    Ok(warp::reply::json(&report))
}

async fn post_component(
    request: ComponentRequest,
    modeler: Arc<ThreatModeler>,
) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&request.analysis_id)?;
    let component = ComponentId::new(request.component.id)
        .map_err(|e| reject(ApiError::BadRequest(e.to_string())))?;

    let threats = modeler
        .enrich_component(&id, &component)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&ComponentThreats { threats }))
}

async fn get_report(id: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&id)?;
    let report = modeler.report(&id).await.map_err(reject)?;
    Ok(warp::reply::json(report.as_ref()))
}

async fn download_report(id: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&id)?;
    let renderer = JsonRenderer;
    let bytes = modeler.render_report(&id, &renderer).await.map_err(reject)?;
    bytes_reply(
        bytes,
        renderer.content_type(),
        Some(format!("attachment; filename=\"report_{id}.json\"")),
    )
}

async fn table_report(id: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    let id = parse_analysis_id(&id)?;
    let renderer = TableRenderer::new();
    let bytes = modeler.render_report(&id, &renderer).await.map_err(reject)?;
    bytes_reply(bytes, renderer.content_type(), None)
}

async fn get_image(file: String, modeler: Arc<ThreatModeler>) -> Result<impl Reply, Rejection> {
    match modeler.image(&file).await.map_err(reject)? {
        Some((bytes, mime)) => bytes_reply(bytes, mime, None),
        None => Err(reject(ApiError::NotFound(format!("no such file: {file}")))),
    }
}
