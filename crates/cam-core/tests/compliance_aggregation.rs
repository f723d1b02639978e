//! Integration tests for the debounced compliance aggregator.
//!
//! Covers the per-control AND-fold, timestamp-based "latest" selection,
//! requirement scoping, and the window/threshold debounce.

use std::sync::Arc;
use std::time::Duration;

use cam_core::{AggregatorConfig, AssessmentResult, CamError, ComplianceAggregator, ErrorKind};
use cam_state::fakes::{MemoryCatalog, MemoryEvaluationLedger, MemoryEvidenceStore};
use cam_state::{
    Catalog, CloudService, Control, EvaluationLedger, EvaluationResult, Evidence, EvidenceStore,
};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

const SERVICE: &str = "00000000-0000-0000-0000-000000000001";

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    aggregator: Arc<ComplianceAggregator>,
    catalog: Arc<MemoryCatalog>,
    evidence: Arc<MemoryEvidenceStore>,
    ledger: Arc<MemoryEvaluationLedger>,
}

async fn harness(config: AggregatorConfig) -> Harness {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .upsert_control(Control {
            id: "OPS-13".into(),
            name: "Transport security".into(),
            metric_ids: vec!["M1".into(), "M2".into()],
        })
        .await
        .unwrap();
    catalog
        .register_cloud_service(CloudService {
            id: SERVICE.into(),
            name: "svc".into(),
            description: String::new(),
            requirement_ids: vec!["OPS-13".into()],
        })
        .await
        .unwrap();

    let evidence = Arc::new(MemoryEvidenceStore::new());
    let ledger = Arc::new(MemoryEvaluationLedger::new());
    let aggregator =
        ComplianceAggregator::new(catalog.clone(), evidence.clone(), ledger.clone(), config);
    Harness {
        aggregator,
        catalog,
        evidence,
        ledger,
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

fn sample_result(metric: &str, status: bool, time: DateTime<Utc>) -> EvaluationResult {
    EvaluationResult {
        id: Uuid::new_v4().to_string(),
        metric_id: metric.to_string(),
        service_id: SERVICE.to_string(),
        evidence_id: Uuid::new_v4().to_string(),
        status,
        time,
    }
}

async fn stored_evidence(h: &Harness) -> String {
    let id = Uuid::new_v4().to_string();
    h.evidence
        .create_evidence(Evidence {
            id: id.clone(),
            name: String::new(),
            target_service: SERVICE.into(),
            target_resource: "res".into(),
            tool_id: "commsec".into(),
            gathered_at: Some(Utc::now()),
            raw_evidence: None,
            value: Some(serde_json::json!({"type": ["TransportEncryption"]})),
            error: None,
        })
        .await
        .unwrap();
    id
}

fn verdict(evidence_id: &str, metric: &str, compliant: bool) -> AssessmentResult {
    AssessmentResult {
        evidence_id: evidence_id.to_string(),
        metric_id: metric.to_string(),
        service_id: "stale-service".into(),
        compliant,
        resource_types: vec!["TransportEncryption".into()],
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Recompute step
// ============================================================================

#[tokio::test]
async fn and_fold_over_latest_results() {
    let h = harness(AggregatorConfig::default()).await;
    h.ledger.append_result(sample_result("M1", true, at(10, 0))).await.unwrap();
    h.ledger.append_result(sample_result("M2", false, at(10, 5))).await.unwrap();

    let compliance = h
        .aggregator
        .recompute_control_compliance(SERVICE, "M1")
        .await
        .unwrap()
        .unwrap();
    assert!(!compliance.status);
    assert_eq!(compliance.control_id, "OPS-13");
    assert_eq!(compliance.evaluations.len(), 2);

    let latest = h.ledger.latest_compliance(SERVICE, "OPS-13").await.unwrap();
    assert_eq!(latest.map(|c| c.id), Some(compliance.id));
}

#[tokio::test]
async fn metric_without_result_is_skipped() {
    let h = harness(AggregatorConfig::default()).await;
    h.ledger.append_result(sample_result("M1", true, at(10, 0))).await.unwrap();

    let compliance = h
        .aggregator
        .recompute_control_compliance(SERVICE, "M2")
        .await
        .unwrap()
        .unwrap();
    assert!(compliance.status);
    assert_eq!(compliance.evaluations.len(), 1);
    assert_eq!(compliance.evaluations[0].metric_id, "M1");
}

#[tokio::test]
async fn control_without_any_result_is_vacuously_compliant() {
    let h = harness(AggregatorConfig::default()).await;
    let compliance = h
        .aggregator
        .recompute_control_compliance(SERVICE, "M1")
        .await
        .unwrap()
        .unwrap();
    assert!(compliance.status);
    assert!(compliance.evaluations.is_empty());
}

#[tokio::test]
async fn older_result_inserted_later_is_ignored() {
    let h = harness(AggregatorConfig::default()).await;
    h.ledger.append_result(sample_result("M1", true, at(10, 0))).await.unwrap();
    h.ledger.append_result(sample_result("M1", false, at(9, 0))).await.unwrap();

    let compliance = h
        .aggregator
        .recompute_control_compliance(SERVICE, "M1")
        .await
        .unwrap()
        .unwrap();
    assert!(compliance.status);
    assert_eq!(compliance.evaluations[0].time, at(10, 0));
}

#[tokio::test]
async fn control_out_of_scope_is_skipped() {
    let h = harness(AggregatorConfig::default()).await;
    h.catalog
        .register_cloud_service(CloudService {
            id: SERVICE.into(),
            name: "svc".into(),
            description: String::new(),
            requirement_ids: vec![],
        })
        .await
        .unwrap();
    h.ledger.append_result(sample_result("M1", true, at(10, 0))).await.unwrap();

    let outcome = h
        .aggregator
        .recompute_control_compliance(SERVICE, "M1")
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert!(h.ledger.compliance_history().is_empty());
}

#[tokio::test]
async fn metric_outside_any_control_is_control_not_found() {
    let h = harness(AggregatorConfig::default()).await;
    let err = h
        .aggregator
        .recompute_control_compliance(SERVICE, "Orphan")
        .await
        .unwrap_err();
    assert!(matches!(err, CamError::ControlNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn explicit_calculation_continues_past_unknown_controls() {
    let h = harness(AggregatorConfig::default()).await;
    h.ledger.append_result(sample_result("M2", false, at(10, 0))).await.unwrap();

    let verdicts = h
        .aggregator
        .calculate_compliance(SERVICE, &["NOPE".to_string(), "OPS-13".to_string()])
        .await
        .unwrap();
    assert_eq!(verdicts.len(), 1);
    assert!(!verdicts[0].status);
}

// ============================================================================
// Result hook
// ============================================================================

#[tokio::test]
async fn result_is_recorded_under_evidence_target_service() {
    let h = harness(AggregatorConfig::default()).await;
    let evidence_id = stored_evidence(&h).await;

    h.aggregator
        .process_result(verdict(&evidence_id, "M1", true))
        .await
        .unwrap();

    let recorded = h.ledger.latest_result(SERVICE, "M1").await.unwrap().unwrap();
    assert_eq!(recorded.evidence_id, evidence_id);
    assert!(recorded.status);
    assert!(h
        .ledger
        .latest_result("stale-service", "M1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_evidence_is_discarded() {
    let h = harness(AggregatorConfig::default()).await;
    let err = h
        .aggregator
        .process_result(verdict(&Uuid::new_v4().to_string(), "M1", true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.ledger.result_history().is_empty());
    assert_eq!(h.aggregator.recompute_count(), 0);
}

#[tokio::test]
async fn hook_records_results_in_background() {
    let h = harness(AggregatorConfig::default()).await;
    let evidence_id = stored_evidence(&h).await;

    let hook = h.aggregator.hook();
    hook.on_result(Ok(verdict(&evidence_id, "M1", false)));
    hook.on_result(Ok(verdict("unknown-evidence", "M1", true)));
    hook.on_result(Err("engine exploded".into()));
    settle().await;

    let history = h.ledger.result_history();
    assert_eq!(history.len(), 1);
    assert!(!history[0].status);
}

// ============================================================================
// Debounce
// ============================================================================

#[tokio::test(start_paused = true)]
async fn burst_below_threshold_recomputes_once_at_window_expiry() {
    let h = harness(AggregatorConfig {
        window: Duration::from_secs(2),
        threshold: 5,
    })
    .await;
    let evidence_id = stored_evidence(&h).await;

    for _ in 0..4 {
        h.aggregator
            .process_result(verdict(&evidence_id, "M1", true))
            .await
            .unwrap();
    }
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 1);
    assert_eq!(h.ledger.compliance_history().len(), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reaching_threshold_recomputes_immediately_and_cancels_timer() {
    let h = harness(AggregatorConfig {
        window: Duration::from_secs(2),
        threshold: 3,
    })
    .await;
    let evidence_id = stored_evidence(&h).await;

    for _ in 0..3 {
        h.aggregator
            .process_result(verdict(&evidence_id, "M1", true))
            .await
            .unwrap();
    }
    assert_eq!(h.aggregator.recompute_count(), 1);
    assert_eq!(h.ledger.compliance_history().len(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn windows_are_independent_per_metric() {
    let h = harness(AggregatorConfig {
        window: Duration::from_secs(2),
        threshold: 100,
    })
    .await;
    let evidence_id = stored_evidence(&h).await;

    h.aggregator
        .process_result(verdict(&evidence_id, "M1", true))
        .await
        .unwrap();
    h.aggregator
        .process_result(verdict(&evidence_id, "M2", false))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.aggregator.recompute_count(), 2);

    let latest = h.ledger.latest_compliance(SERVICE, "OPS-13").await.unwrap().unwrap();
    assert!(!latest.status);
}
