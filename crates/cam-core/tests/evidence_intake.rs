//! Integration tests for the evidence intake pipeline.

use std::sync::Arc;

use cam_core::fakes::RecordingAssessmentEngine;
use cam_core::{ndjson_evidence, ChannelError, EvidenceIntake, IntakeSummary};
use cam_state::fakes::MemoryEvidenceStore;
use cam_state::{Evidence, EvidenceError, EvidenceStore};
use chrono::Utc;
use uuid::Uuid;

const SERVICE: &str = "00000000-0000-0000-0000-000000000001";

// ============================================================================
// Helpers
// ============================================================================

fn sample_evidence() -> Evidence {
    Evidence {
        id: Uuid::new_v4().to_string(),
        name: "tls-endpoint".into(),
        target_service: SERVICE.into(),
        target_resource: "https://svc.example".into(),
        tool_id: "commsec".into(),
        gathered_at: Some(Utc::now()),
        raw_evidence: Some("{}".into()),
        value: Some(serde_json::json!({"type": ["TransportEncryption"], "tlsVersion": "1.3"})),
        error: None,
    }
}

fn with_error(mut ev: Evidence) -> Evidence {
    ev.value = None;
    ev.error = Some(EvidenceError {
        code: "ConnectionRefused".into(),
        description: "target did not answer".into(),
    });
    ev
}

fn setup() -> (
    EvidenceIntake,
    Arc<MemoryEvidenceStore>,
    Arc<RecordingAssessmentEngine>,
) {
    let store = Arc::new(MemoryEvidenceStore::new());
    let engine = Arc::new(RecordingAssessmentEngine::new());
    (
        EvidenceIntake::new(store.clone(), engine.clone()),
        store,
        engine,
    )
}

// ============================================================================
// Per-item handling
// ============================================================================

#[tokio::test]
async fn valid_evidence_is_stored_and_forwarded() {
    let (intake, store, engine) = setup();
    let ev = sample_evidence();
    let id = ev.id.clone();

    let summary = intake
        .process_channel("peer", futures::stream::iter(vec![Ok(ev)]))
        .await
        .unwrap();

    assert_eq!(
        summary,
        IntakeSummary {
            received: 1,
            stored: 1,
            forwarded: 1,
            dropped: 0,
            failed: 0,
        }
    );
    assert!(store.get_evidence(&id).await.is_ok());
    let submitted = engine.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].evidence_id, id);
    assert_eq!(submitted[0].service_id, SERVICE);
    assert_eq!(submitted[0].tool_id, "commsec");
}

#[tokio::test]
async fn evidence_with_error_is_stored_but_not_forwarded() {
    let (intake, store, engine) = setup();
    let ev = with_error(sample_evidence());
    let id = ev.id.clone();

    let summary = intake
        .process_channel("peer", futures::stream::iter(vec![Ok(ev)]))
        .await
        .unwrap();

    assert_eq!(summary.stored, 1);
    assert_eq!(summary.forwarded, 0);
    assert_eq!(engine.attempts(), 0);
    let stored = store.get_evidence(&id).await.unwrap();
    assert!(stored.error.is_some());
}

#[tokio::test]
async fn invalid_items_are_dropped_without_aborting() {
    let (intake, store, engine) = setup();

    let mut bad_id = sample_evidence();
    bad_id.id = "not-a-uuid".into();
    let mut no_time = sample_evidence();
    no_time.gathered_at = None;
    let mut scalar = sample_evidence();
    scalar.value = Some(serde_json::json!(42));
    let good = sample_evidence();

    let items = vec![
        Ok(bad_id),
        Err(ChannelError::Decode("expected value at line 1".into())),
        Ok(no_time),
        Ok(scalar),
        Ok(good),
    ];
    let summary = intake
        .process_channel("peer", futures::stream::iter(items))
        .await
        .unwrap();

    assert_eq!(summary.received, 5);
    assert_eq!(summary.dropped, 4);
    assert_eq!(summary.stored, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(engine.submitted().len(), 1);
}

#[tokio::test]
async fn storage_and_submit_failures_do_not_stop_the_loop() {
    let (intake, store, engine) = setup();
    let first = sample_evidence();
    let duplicate = first.clone();
    let other = sample_evidence();

    let summary = intake
        .process_channel(
            "peer",
            futures::stream::iter(vec![Ok(first), Ok(duplicate), Ok(other)]),
        )
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.stored, 2);
    assert_eq!(store.len(), 2);

    engine.set_failing(true);
    let summary = intake
        .process_channel(
            "peer",
            futures::stream::iter(vec![Ok(sample_evidence()), Ok(sample_evidence())]),
        )
        .await
        .unwrap();
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.forwarded, 0);
    assert_eq!(engine.attempts(), 4);
}

// ============================================================================
// Channel termination
// ============================================================================

#[tokio::test]
async fn transport_failure_aborts_but_keeps_processed_items() {
    let (intake, store, _engine) = setup();
    let before = sample_evidence();
    let after = sample_evidence();
    let before_id = before.id.clone();
    let after_id = after.id.clone();

    let items = vec![
        Ok(before),
        Err(ChannelError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer reset",
        ))),
        Ok(after),
    ];
    let aborted = intake
        .process_channel("peer", futures::stream::iter(items))
        .await
        .unwrap_err();

    assert_eq!(aborted.summary.received, 1);
    assert_eq!(aborted.source.kind(), std::io::ErrorKind::ConnectionReset);
    assert!(store.get_evidence(&before_id).await.is_ok());
    assert!(store.get_evidence(&after_id).await.is_err());
}

#[tokio::test]
async fn ndjson_channel_ends_cleanly_at_eof() {
    let (intake, store, engine) = setup();
    let a = sample_evidence();
    let b = with_error(sample_evidence());
    let input = format!(
        "{}\n\n{{ broken\n{}\n",
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );

    let channel = Box::pin(ndjson_evidence(input.as_bytes()));
    let summary = intake.process_channel("peer", channel).await.unwrap();

    assert_eq!(summary.received, 3);
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.forwarded, 1);
    assert_eq!(store.len(), 2);
    assert_eq!(engine.submitted().len(), 1);
}

#[tokio::test]
async fn non_utf8_line_is_dropped_and_channel_continues() {
    let (intake, store, engine) = setup();
    let a = sample_evidence();
    let b = sample_evidence();
    let mut input = serde_json::to_vec(&a).unwrap();
    input.extend_from_slice(b"\n\xff\xfe garbage\n");
    input.extend_from_slice(&serde_json::to_vec(&b).unwrap());
    input.push(b'\n');

    let channel = Box::pin(ndjson_evidence(&input[..]));
    let summary = intake.process_channel("peer", channel).await.unwrap();

    assert_eq!(summary.received, 3);
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.forwarded, 2);
    assert!(store.get_evidence(&b.id).await.is_ok());
    assert_eq!(engine.submitted().len(), 2);
}
