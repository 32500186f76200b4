//! HTTP surface tests using `warp::test`.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use stride_core::ThreatModeler;
use stride_model::{AnalysisId, Report};
use stride_server::{routes, ComponentThreats, FRONTEND_ORIGIN};
use stride_test_utils::{
    setup_modeler, setup_scripted_modeler, FailingGateway, ScriptedGateway, PNG_BYTES,
    SAMPLE_THREAT_COUNT,
};
use warp::http::StatusCode;

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn upload(modeler: &Arc<ThreatModeler>) -> Value {
    let resp = warp::test::request()
        .method("POST")
        .path("/api/upload?filename=arch.png")
        .body(PNG_BYTES)
        .reply(&routes(Arc::clone(modeler)))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp.body())
}

async fn uploaded() -> (Arc<ThreatModeler>, String) {
    let (modeler, _) = setup_scripted_modeler();
    let modeler = Arc::new(modeler);
    let body = upload(&modeler).await;
    let id = body["analysis_id"].as_str().unwrap().to_string();
    (modeler, id)
}

#[tokio::test]
async fn upload_returns_analysis_id() {
    let (modeler, _) = setup_scripted_modeler();
    let modeler = Arc::new(modeler);
    let body = upload(&modeler).await;

    assert!(body.get("error").is_none());
    assert_eq!(body["message"], "analysis complete");
    let id: AnalysisId = body["analysis_id"].as_str().unwrap().parse().unwrap();
    assert!(modeler.registry().contains(&id));
}

#[tokio::test]
async fn unparsable_extraction_is_reported_not_failed() {
    let modeler = Arc::new(setup_modeler(Arc::new(ScriptedGateway::new("not json at all"))));
    let body = upload(&modeler).await;

    assert!(body["analysis_id"].is_string());
    assert!(body["error"].as_str().unwrap().contains("not json at all"));
}

#[tokio::test]
async fn embedded_json_is_repaired_on_upload() {
    let reply = r#"Here you go: {"components": [{"id": "a", "label": "API", "type": "api_gateway"}], "graph": {"nodes": ["a"], "edges": []}} hope it helps"#;
    let modeler = Arc::new(setup_modeler(Arc::new(ScriptedGateway::new(reply))));
    let body = upload(&modeler).await;
    assert!(body.get("error").is_none(), "body was {body}");

    let id = body["analysis_id"].as_str().unwrap();
    let resp = warp::test::request()
        .path(&format!("/api/analysis/{id}"))
        .reply(&routes(modeler))
        .await;
    let extraction = json_body(resp.body());
    assert_eq!(extraction["components"][0]["label"], "API");
}

#[tokio::test]
async fn gateway_outage_still_answers() {
    let modeler = Arc::new(setup_modeler(Arc::new(FailingGateway::default())));
    let body = upload(&modeler).await;
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn empty_upload_is_bad_request() {
    let (modeler, _) = setup_scripted_modeler();
    let resp = warp::test::request()
        .method("POST")
        .path("/api/upload")
        .body("")
        .reply(&routes(Arc::new(modeler)))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp.body())["error"].is_string());
}

#[tokio::test]
async fn analysis_lookup() {
    let (modeler, id) = uploaded().await;
    let filter = routes(modeler);

    let resp = warp::test::request()
        .path(&format!("/api/analysis/{id}"))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let extraction = json_body(resp.body());
    assert_eq!(extraction["components"].as_array().unwrap().len(), 3);
    assert_eq!(extraction["analysis_id"], id.as_str());

    let resp = warp::test::request()
        .path(&format!("/api/analysis/{}", AnalysisId::new()))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = warp::test::request()
        .path("/api/analysis/not-a-uuid")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stride_report_over_sample() {
    let (modeler, id) = uploaded().await;
    let resp = warp::test::request()
        .path(&format!("/api/stride/{id}"))
        .reply(&routes(modeler))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let report: Report = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(report.components_count, 3);
    assert_eq!(report.threats.len(), SAMPLE_THREAT_COUNT);
}

#[tokio::test]
async fn component_endpoint_and_assembled_download() {
    let (modeler, id) = uploaded().await;
    let filter = routes(modeler);

    let resp = warp::test::request()
        .method("POST")
        .path("/api/stride/component")
        .json(&json!({"analysis_id": id, "component": {"id": "c3", "label": "Auth DB"}}))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let threats: ComponentThreats = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(threats.threats.len(), 4);

    let resp = warp::test::request()
        .path(&format!("/api/report/{id}/download"))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert_eq!(
        resp.headers()["content-disposition"],
        format!("attachment; filename=\"report_{id}.json\"").as_str()
    );
    let report: Report = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(report.components_count, 1);
    assert_eq!(report.threats, threats.threats);
}

#[tokio::test]
async fn unknown_component_is_bad_request() {
    let (modeler, id) = uploaded().await;
    let resp = warp::test::request()
        .method("POST")
        .path("/api/stride/component")
        .json(&json!({"analysis_id": id, "component": {"id": "ghost"}}))
        .reply(&routes(modeler))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp.body())["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn malformed_component_body_is_bad_request() {
    let (modeler, _) = setup_scripted_modeler();
    let resp = warp::test::request()
        .method("POST")
        .path("/api/stride/component")
        .json(&json!({"component": {"id": "c1"}}))
        .reply(&routes(Arc::new(modeler)))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_and_table() {
    let (modeler, id) = uploaded().await;
    let filter = routes(modeler);

    let resp = warp::test::request()
        .path(&format!("/api/report/{id}"))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Report = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(report.threats.len(), SAMPLE_THREAT_COUNT);

    let resp = warp::test::request()
        .path(&format!("/api/report/{id}/table"))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(resp.body().to_vec()).unwrap();
    assert!(text.contains(&id));
    assert!(text.contains("Auth DB"));
}

#[tokio::test]
async fn uploaded_image_is_served() {
    let (modeler, id) = uploaded().await;
    let filter = routes(modeler);

    let resp = warp::test::request()
        .path(&format!("/static/{id}.png"))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.body().as_ref(), PNG_BYTES);

    let resp = warp::test::request()
        .path("/static/missing.png")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_analyses() {
    let (modeler, _) = uploaded().await;
    let resp = warp::test::request()
        .path("/health")
        .reply(&routes(modeler))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp.body());
    assert_eq!(body["status"], "ok");
    assert_eq!(body["analyses"], 1);
}

#[tokio::test]
async fn cors_preflight_allows_frontend() {
    let (modeler, _) = setup_scripted_modeler();
    let resp = warp::test::request()
        .method("OPTIONS")
        .path("/api/upload")
        .header("origin", FRONTEND_ORIGIN)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .reply(&routes(Arc::new(modeler)))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], FRONTEND_ORIGIN);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (modeler, _) = setup_scripted_modeler();
    let resp = warp::test::request()
        .path("/api/nowhere")
        .reply(&routes(Arc::new(modeler)))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(json_body(resp.body())["error"].is_string());
}
