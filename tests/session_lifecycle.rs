//! Session state machine: deadline enforcement, finalization, and the
//! session-level audit record.

mod support;

use chrono::Duration;
use common::access::Decision;
use gate_service::verify::mock::{MockFaceBackend, MockPlateExtractor};
use gate_service::GateError;
use support::{fixture, test_frame};

#[tokio::test]
async fn test_frames_are_rejected_after_the_deadline() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let session = fix.engine.start_session(Some(20)).await.expect("start");

    fix.clock.advance(Duration::seconds(21));
    let result = fix.engine.process_frame(&session.id, &test_frame(1)).await;
    assert!(matches!(result, Err(GateError::SessionExpired(_))));

    // No attempt is recorded for a rejected call.
    assert!(fix.log.attempts().await.is_empty());

    // The expired session still finalizes and flushes its summary.
    let summary = fix.engine.end_session(&session.id).await.expect("end");
    assert_eq!(summary.identities_admitted, 0);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(fix.log.summaries().await.len(), 1);
}

#[tokio::test]
async fn test_summary_counts_admissions_and_frames() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");
    for sequence in 1..=4 {
        let decision = fix
            .engine
            .process_frame(&session.id, &test_frame(sequence))
            .await
            .expect("process");
        assert_eq!(decision.decision, Decision::Granted);
    }

    fix.clock.advance(Duration::seconds(7));
    let summary = fix.engine.end_session(&session.id).await.expect("end");

    // Four granted frames, one distinct identity.
    assert_eq!(summary.identities_admitted, 1);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.decisions_made, 4);
    assert!((summary.duration_secs - 7.0).abs() < 0.001);

    let logged = fix.log.summaries().await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].session_id, session.id);
}

#[tokio::test]
async fn test_default_session_duration_applies() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");
    assert_eq!(
        session.deadline.signed_duration_since(session.started_at),
        Duration::seconds(20)
    );
}

#[tokio::test]
async fn test_ended_session_rejects_further_frames() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");
    fix.engine.end_session(&session.id).await.expect("end");

    assert!(matches!(
        fix.engine.process_frame(&session.id, &test_frame(1)).await,
        Err(GateError::SessionNotFound(_))
    ));
    assert!(matches!(
        fix.engine.end_session(&session.id).await,
        Err(GateError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    assert!(matches!(
        fix.engine.process_frame("no-such-id", &test_frame(1)).await,
        Err(GateError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_sessions_track_admissions_separately() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let first = fix.engine.start_session(None).await.expect("start");
    let second = fix.engine.start_session(None).await.expect("start");

    fix.engine
        .process_frame(&first.id, &test_frame(1))
        .await
        .expect("process");
    fix.engine
        .process_frame(&second.id, &test_frame(1))
        .await
        .expect("process");

    // The same identity earns a first-grant record in each session.
    assert_eq!(fix.log.first_grants().await.len(), 2);

    let first_summary = fix.engine.end_session(&first.id).await.expect("end");
    let second_summary = fix.engine.end_session(&second.id).await.expect("end");
    assert_eq!(first_summary.identities_admitted, 1);
    assert_eq!(second_summary.identities_admitted, 1);
}
