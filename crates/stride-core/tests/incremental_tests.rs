//! Incremental enrichment and report assembly.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use stride_core::{get_json, keys, PipelineError};
use stride_model::{AnalysisId, ComponentId, Report};
use stride_test_utils::{
    setup_modeler, setup_scripted_modeler, ScriptedGateway, SlowGateway, PNG_BYTES,
    SAMPLE_THREAT_COUNT,
};

fn cid(id: &str) -> ComponentId {
    ComponentId::new(id).unwrap()
}

#[tokio::test]
async fn two_calls_then_download_give_their_union() {
    let (modeler, _) = setup_scripted_modeler();
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let first = modeler.enrich_component(&id, &cid("c1")).await.unwrap();
    let second = modeler.enrich_component(&id, &cid("c2")).await.unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 6);

    let report = modeler.report(&id).await.unwrap();
    assert_eq!(report.components_count, 2);
    let expected: Vec<_> = first.iter().chain(second.iter()).cloned().collect();
    assert_eq!(report.threats, expected);
}

#[tokio::test]
async fn repeated_component_is_counted_once() {
    let (modeler, _) = setup_scripted_modeler();
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    modeler.enrich_component(&id, &cid("c3")).await.unwrap();
    modeler.enrich_component(&id, &cid("c1")).await.unwrap();
    modeler.enrich_component(&id, &cid("c3")).await.unwrap();

    let report = modeler.report(&id).await.unwrap();
    assert_eq!(report.components_count, 2);
    assert_eq!(report.threats.len(), 4 + 4);
    // First-call order is kept when a component is enriched again.
    assert_eq!(report.threats[0].component, "Auth DB");
    assert_eq!(report.threats[4].component, "Browser");
}

#[tokio::test]
async fn unknown_ids_are_client_errors() {
    let (modeler, _) = setup_scripted_modeler();
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let err = modeler.enrich_component(&id, &cid("ghost")).await.unwrap_err();
    assert!(err.is_validation());

    let err = modeler
        .enrich_component(&AnalysisId::new(), &cid("c1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AnalysisNotFound(_)));
}

#[tokio::test]
async fn racing_calls_on_one_analysis_lose_nothing() {
    let (modeler, _) = setup_scripted_modeler();
    let modeler = Arc::new(modeler);
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let handles: Vec<_> = ["c1", "c2", "c3", "c1", "c2", "c3"]
        .into_iter()
        .map(|component| {
            let modeler = Arc::clone(&modeler);
            tokio::spawn(async move { modeler.enrich_component(&id, &cid(component)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = modeler.report(&id).await.unwrap();
    assert_eq!(report.components_count, 3);
    assert_eq!(report.threats.len(), SAMPLE_THREAT_COUNT);
}

#[tokio::test]
async fn racing_calls_on_different_analyses_are_independent() {
    let (modeler, _) = setup_scripted_modeler();
    let a = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;
    let b = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let (c1, c2) = (cid("c1"), cid("c2"));
    let (ra, rb) = tokio::join!(
        modeler.enrich_component(&a, &c1),
        modeler.enrich_component(&b, &c2),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(modeler.report(&a).await.unwrap().components_count, 1);
    assert_eq!(modeler.report(&b).await.unwrap().threats.len(), 6);
}

#[tokio::test]
async fn incremental_call_after_cached_report_refreshes_it() {
    let (modeler, _) = setup_scripted_modeler();
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let full = modeler.report(&id).await.unwrap();
    assert_eq!(full.components_count, 3);

    modeler.enrich_component(&id, &cid("c2")).await.unwrap();
    let assembled = modeler.report(&id).await.unwrap();
    assert_eq!(assembled.components_count, 1);
    assert!(assembled.threats.iter().all(|t| t.component == "Web Server"));
}

#[tokio::test]
async fn report_racing_an_incremental_call_is_not_served_afterwards() {
    let slow = Arc::new(SlowGateway::new(ScriptedGateway::sample(), Duration::from_millis(200)));
    let modeler = Arc::new(setup_modeler(slow));
    let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;

    let enrich = {
        let modeler = Arc::clone(&modeler);
        tokio::spawn(async move { modeler.enrich_component(&id, &cid("c1")).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let racing = {
        let modeler = Arc::clone(&modeler);
        tokio::spawn(async move { modeler.report(&id).await })
    };

    let records = enrich.await.unwrap().unwrap();
    racing.await.unwrap().unwrap();

    let report = modeler.report(&id).await.unwrap();
    assert_eq!(report.components_count, 1);
    assert_eq!(report.threats, records);

    let stored: Report = get_json(modeler.store().as_ref(), &keys::report(&id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.components_count, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn components_count_matches_distinct_contributors(
        calls in proptest::collection::vec(prop_oneof![Just("c1"), Just("c2"), Just("c3")], 1..8)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let report = runtime.block_on(async {
            let (modeler, _) = setup_scripted_modeler();
            let id = modeler.analyze_image(PNG_BYTES.to_vec(), None).await.unwrap().analysis_id;
            for component in &calls {
                modeler.enrich_component(&id, &cid(component)).await.unwrap();
            }
            modeler.report(&id).await.unwrap()
        });

        let distinct_calls: HashSet<_> = calls.iter().collect();
        let contributors: HashSet<_> = report.threats.iter().map(|t| t.component.as_str()).collect();
        prop_assert_eq!(report.components_count, distinct_calls.len());
        prop_assert_eq!(contributors.len(), distinct_calls.len());
    }
}
