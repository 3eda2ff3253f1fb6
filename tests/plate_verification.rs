//! Plate-signal behavior observed through the whole engine: normalization,
//! registry changes taking effect between frames, and duplicate handling.

mod support;

use common::access::{Decision, DecisionReason};
use gate_service::verify::mock::{MockFaceBackend, MockPlateExtractor};
use gate_service::verify::VehicleRegistry;
use support::{fixture, test_frame};

#[tokio::test]
async fn test_extracted_text_is_normalized_before_registry_lookup() {
    // The extractor reads raw, messy text; the registered key is AB123CD.
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading(" ab 123 cd "),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");
    let decision = fix
        .engine
        .process_frame(&session.id, &test_frame(1))
        .await
        .expect("process");

    assert_eq!(decision.decision, Decision::Granted);
    assert_eq!(decision.matched_plate.as_deref(), Some("AB123CD"));
}

#[tokio::test]
async fn test_vehicle_removal_revokes_access_between_frames() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");

    let before = fix
        .engine
        .process_frame(&session.id, &test_frame(1))
        .await
        .expect("process");
    assert_eq!(before.decision, Decision::Granted);

    assert!(fix.registry.remove("AB123CD").await.expect("remove"));

    // The extraction cache may still hold the plate text; registration is
    // always re-checked, so the gate closes immediately.
    let after = fix
        .engine
        .process_frame(&session.id, &test_frame(1))
        .await
        .expect("process");
    assert_eq!(after.decision, Decision::Denied);
    assert_eq!(after.reason, DecisionReason::UnregisteredVehicle);
}

#[tokio::test]
async fn test_duplicate_registration_reports_non_error_outcome() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("AB123CD"),
    )
    .await;

    let outcome = fix.registry.register("AB 123 CD").await.expect("register");
    assert!(!outcome.success);
    assert!(outcome.message.contains("already registered"));
    assert_eq!(fix.registry.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn test_newly_registered_vehicle_is_admitted_next_frame() {
    let fix = fixture(
        MockFaceBackend::known(1, 40.0),
        MockPlateExtractor::reading("XY999A"),
    )
    .await;

    let session = fix.engine.start_session(None).await.expect("start");

    let before = fix
        .engine
        .process_frame(&session.id, &test_frame(1))
        .await
        .expect("process");
    assert_eq!(before.reason, DecisionReason::UnregisteredVehicle);

    let outcome = fix.registry.register("XY999A").await.expect("register");
    assert!(outcome.success);

    let after = fix
        .engine
        .process_frame(&session.id, &test_frame(1))
        .await
        .expect("process");
    assert_eq!(after.decision, Decision::Granted);
}
