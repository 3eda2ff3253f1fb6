//! The gate decision engine: evaluates the face and plate signals
//! independently for every frame, fuses them under an AND rule, keeps the
//! session admission set, and appends every outcome to the audit trail.
//!
//! AND-fusion is a deliberate security property: a person and a vehicle
//! must clear verification independently before the gate opens. Do not
//! weaken it to an OR rule.

use crate::clock::Clock;
use crate::error::GateError;
use crate::session::{SessionState, SessionTracker};
use crate::sink::AccessLog;
use crate::verify::face::{FaceVerifier, RegionOutcome};
use crate::verify::plate::PlateVerifier;
use base64::Engine;
use chrono::Duration;
use common::access::{
    Decision, DecisionReason, FaceStatus, GateDecision, Identity, PlateMatchResult, SessionSummary,
    VideoFrame,
};
use image::DynamicImage;
use std::sync::Arc;
use tracing::{info, warn};

/// Frame-level face verdict reduced from the per-region outcomes.
#[derive(Debug, Clone)]
struct FrameFaceVerdict {
    status: FaceStatus,
    identity: Option<Identity>,
}

pub struct GateEngine {
    face: FaceVerifier,
    plate: PlateVerifier,
    sessions: SessionTracker,
    log: Arc<dyn AccessLog>,
    clock: Arc<dyn Clock>,
    default_session_secs: u64,
}

impl GateEngine {
    pub fn new(
        face: FaceVerifier,
        plate: PlateVerifier,
        sessions: SessionTracker,
        log: Arc<dyn AccessLog>,
        clock: Arc<dyn Clock>,
        default_session_secs: u64,
    ) -> Self {
        Self {
            face,
            plate,
            sessions,
            log,
            clock,
            default_session_secs,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Whether the engine can verify faces at all.
    pub fn ready(&self) -> bool {
        self.face.ensure_ready().is_ok()
    }

    /// Start a monitoring session. Fails up-front when the face matcher has
    /// no trained model; a session must never silently treat everyone as
    /// unknown.
    pub async fn start_session(&self, duration_secs: Option<u64>) -> Result<SessionState, GateError> {
        self.face.ensure_ready()?;

        let duration = Duration::seconds(duration_secs.unwrap_or(self.default_session_secs) as i64);
        let session = self.sessions.start(duration).await;
        info!(
            session_id = %session.id,
            deadline = %session.deadline,
            "gate session started"
        );
        Ok(session)
    }

    /// Process one frame within a running session and return the fused
    /// decision. Every call, whatever the outcome, appends exactly one
    /// attempt record.
    pub async fn process_frame(
        &self,
        session_id: &str,
        frame: &VideoFrame,
    ) -> Result<GateDecision, GateError> {
        self.sessions.guard_running(session_id).await?;
        let started = std::time::Instant::now();

        let (face_verdict, plate_result) = match decode_frame(frame) {
            Some((bytes, image)) => {
                let outcomes = self.face.evaluate(&image).await?;
                let verdict = reduce_face(outcomes);
                let plate = self.plate.evaluate(&bytes).await;
                (verdict, plate)
            }
            None => {
                warn!(
                    session_id,
                    sequence = frame.sequence,
                    "frame could not be decoded, denying"
                );
                (
                    FrameFaceVerdict {
                        status: FaceStatus::NoFace,
                        identity: None,
                    },
                    PlateMatchResult {
                        plate_text: None,
                        registered: false,
                    },
                )
            }
        };

        let (decision, reason, detail) = fuse(&face_verdict, &plate_result);
        let gate_decision = GateDecision {
            timestamp: self.clock.now(),
            decision,
            reason,
            detail,
            matched_identity: face_verdict.identity,
            matched_plate: if plate_result.registered {
                plate_result.plate_text
            } else {
                None
            },
            frame_sequence: frame.sequence,
        };

        // The first-grant record is written before the attempt record so it
        // never trails the granted attempt it belongs to.
        if gate_decision.decision == Decision::Granted {
            if let Some(identity) = &gate_decision.matched_identity {
                let first = self.sessions.record_admission(session_id, identity.id).await?;
                if first {
                    self.log
                        .append_first_grant(session_id, identity.id, gate_decision.timestamp)
                        .await?;
                    telemetry::metrics::GATE_FIRST_GRANTS.inc();
                    info!(
                        session_id,
                        identity_id = identity.id,
                        name = %identity.name,
                        "first admission this session"
                    );
                }
            }
        }

        self.log.append_attempt(session_id, &gate_decision).await?;
        self.sessions.note_decision(session_id).await?;

        telemetry::metrics::GATE_DECISIONS
            .with_label_values(&[
                &gate_decision.decision.to_string(),
                &gate_decision.reason.to_string(),
            ])
            .inc();
        telemetry::metrics::GATE_DECISION_LATENCY.observe(started.elapsed().as_secs_f64());

        info!(
            session_id,
            sequence = frame.sequence,
            decision = %gate_decision.decision,
            reason = %gate_decision.reason,
            "processed frame"
        );

        Ok(gate_decision)
    }

    /// End a session: finalize, flush the summary to the audit trail, and
    /// return it. Expired sessions end the same way; there is no silent
    /// abort path.
    pub async fn end_session(&self, session_id: &str) -> Result<SessionSummary, GateError> {
        let summary = self.sessions.finalize(session_id).await?;
        self.log.append_session_summary(&summary).await?;
        info!(
            session_id,
            identities_admitted = summary.identities_admitted,
            frames_processed = summary.frames_processed,
            duration_secs = summary.duration_secs,
            "gate session finalized"
        );
        Ok(summary)
    }
}

fn decode_frame(frame: &VideoFrame) -> Option<(Vec<u8>, DynamicImage)> {
    let bytes = base64::prelude::BASE64_STANDARD.decode(&frame.data).ok()?;
    let image = image::load_from_memory(&bytes).ok()?;
    Some((bytes, image))
}

/// Frame-level verdict: the first KNOWN region in detection order wins;
/// UNKNOWN if any region was present; NO_FACE for an empty region list.
fn reduce_face(outcomes: Vec<RegionOutcome>) -> FrameFaceVerdict {
    if outcomes.is_empty() {
        return FrameFaceVerdict {
            status: FaceStatus::NoFace,
            identity: None,
        };
    }

    for outcome in outcomes {
        if outcome.result.status == FaceStatus::Known {
            return FrameFaceVerdict {
                status: FaceStatus::Known,
                identity: outcome.identity,
            };
        }
    }

    FrameFaceVerdict {
        status: FaceStatus::Unknown,
        identity: None,
    }
}

/// AND-fusion: both signals must pass independently.
fn fuse(face: &FrameFaceVerdict, plate: &PlateMatchResult) -> (Decision, DecisionReason, String) {
    match face.status {
        FaceStatus::NoFace => (
            Decision::Denied,
            DecisionReason::NoFaceDetected,
            "no face detected".to_string(),
        ),
        FaceStatus::Unknown => (
            Decision::Denied,
            DecisionReason::UnknownFace,
            "unknown face detected".to_string(),
        ),
        FaceStatus::Known => match &plate.plate_text {
            None => (
                Decision::Denied,
                DecisionReason::NoPlateDetected,
                "no number plate detected".to_string(),
            ),
            Some(plate_text) if !plate.registered => (
                Decision::Denied,
                DecisionReason::UnregisteredVehicle,
                format!("unregistered vehicle detected: {}", plate_text),
            ),
            Some(_) => (
                Decision::Granted,
                DecisionReason::AllVerified,
                "all verified".to_string(),
            ),
        },
    }
}
