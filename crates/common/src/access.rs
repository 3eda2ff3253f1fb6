//! Shared contracts for the gate access-control pipeline.
//!
//! This module defines the verification results, gate decisions, and API
//! payloads exchanged between the gate service and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered person known to the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Unique identity id assigned at registration
    pub id: u32,

    /// Person's display name
    pub name: String,

    /// External id (badge / national id number)
    pub external_id: String,

    /// Contact email
    pub email: String,

    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

/// A vehicle registered for gate access. The normalized plate text is the
/// natural key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredVehicle {
    /// Normalized plate text (whitespace stripped, upper-cased)
    pub plate: String,

    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

/// Outcome of a vehicle registration attempt. A duplicate plate is reported
/// here, not as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub message: String,
}

/// Pixel region of a detected face within a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Verdict for a single evaluated face region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStatus {
    /// Matched an enrolled identity within the confidence threshold
    Known,

    /// A face was present but did not clear verification
    Unknown,

    /// No face region was detected in the frame
    NoFace,
}

/// Result of evaluating one face region. Transient, not persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatchResult {
    pub status: FaceStatus,

    /// Matched identity id when status is `Known`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<u32>,

    /// Matcher distance score; non-negative, lower is better
    pub distance: f32,
}

/// Result of evaluating the plate signal for one frame. Transient, not
/// persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlateMatchResult {
    /// Normalized plate text, or None when no legible plate was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_text: Option<String>,

    /// Whether the plate is present in the vehicle registry
    pub registered: bool,
}

/// Final admit/deny outcome for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Granted,
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Granted => write!(f, "granted"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "granted" => Ok(Decision::Granted),
            "denied" => Ok(Decision::Denied),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// Why a decision came out the way it did. Denial reasons are specific
/// enough to distinguish no-face, unknown-face, no-plate, and
/// unregistered-plate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AllVerified,
    NoFaceDetected,
    UnknownFace,
    NoPlateDetected,
    UnregisteredVehicle,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionReason::AllVerified => "all_verified",
            DecisionReason::NoFaceDetected => "no_face_detected",
            DecisionReason::UnknownFace => "unknown_face",
            DecisionReason::NoPlateDetected => "no_plate_detected",
            DecisionReason::UnregisteredVehicle => "unregistered_vehicle",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for DecisionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_verified" => Ok(DecisionReason::AllVerified),
            "no_face_detected" => Ok(DecisionReason::NoFaceDetected),
            "unknown_face" => Ok(DecisionReason::UnknownFace),
            "no_plate_detected" => Ok(DecisionReason::NoPlateDetected),
            "unregistered_vehicle" => Ok(DecisionReason::UnregisteredVehicle),
            _ => Err(format!("Invalid decision reason: {}", s)),
        }
    }
}

/// The fused outcome of processing one frame. Created once per frame,
/// appended to the audit trail, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    /// Decision timestamp
    pub timestamp: DateTime<Utc>,

    pub decision: Decision,

    pub reason: DecisionReason,

    /// Human-readable reason detail
    pub detail: String,

    /// Verified identity when the face signal passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_identity: Option<Identity>,

    /// Verified plate when the plate signal passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_plate: Option<String>,

    /// Sequence number of the processed frame
    pub frame_sequence: u64,
}

/// Summary of one bounded monitoring session, flushed to the audit trail
/// when the session finalizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,

    pub started_at: DateTime<Utc>,

    pub ended_at: DateTime<Utc>,

    /// Number of distinct identities admitted during the session
    pub identities_admitted: u64,

    pub frames_processed: u64,

    pub decisions_made: u64,

    pub duration_secs: f64,
}

/// A camera frame submitted for gate processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Source camera or stream id
    pub source_id: String,

    /// Frame timestamp (Unix timestamp in milliseconds)
    pub timestamp: u64,

    /// Frame sequence number
    pub sequence: u64,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Image format (e.g., "jpeg", "png")
    pub format: String,

    /// Frame data (base64 encoded for JSON transport)
    pub data: String,
}

/// Request to start a monitoring session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStartRequest {
    /// Wall-clock session budget; the configured default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

/// Response to a session start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartResponse {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Live snapshot of a running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub admitted_count: u64,
    pub frames_processed: u64,
    pub decisions_made: u64,
}

/// Request to register a vehicle plate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterVehicleRequest {
    pub plate: String,
}

/// List of registered vehicles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleListResponse {
    pub vehicles: Vec<RegisteredVehicle>,
}

/// Request to register a person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterIdentityRequest {
    pub name: String,
    pub external_id: String,
    pub email: String,
}

/// List of registered identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityListResponse {
    pub identities: Vec<Identity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_display_roundtrip() {
        for decision in [Decision::Granted, Decision::Denied] {
            let parsed: Decision = decision
                .to_string()
                .parse()
                .unwrap_or_else(|e: String| panic!("{}", e));
            assert_eq!(parsed, decision);
        }
    }

    #[test]
    fn test_decision_reason_display_roundtrip() {
        let reasons = [
            DecisionReason::AllVerified,
            DecisionReason::NoFaceDetected,
            DecisionReason::UnknownFace,
            DecisionReason::NoPlateDetected,
            DecisionReason::UnregisteredVehicle,
        ];

        for reason in reasons {
            let parsed: DecisionReason = reason
                .to_string()
                .parse()
                .unwrap_or_else(|e: String| panic!("{}", e));
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn test_gate_decision_serialization() {
        let decision = GateDecision {
            timestamp: Utc::now(),
            decision: Decision::Denied,
            reason: DecisionReason::UnregisteredVehicle,
            detail: "unregistered vehicle detected: XY999".to_string(),
            matched_identity: None,
            matched_plate: None,
            frame_sequence: 7,
        };

        let json = serde_json::to_string(&decision).expect("serialize");
        assert!(json.contains("unregistered_vehicle"));
        assert!(!json.contains("matched_identity"));

        let deserialized: GateDecision = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(deserialized.decision, Decision::Denied);
        assert_eq!(deserialized.reason, DecisionReason::UnregisteredVehicle);
        assert_eq!(deserialized.frame_sequence, 7);
    }

    #[test]
    fn test_face_status_serialization() {
        let json = serde_json::to_string(&FaceStatus::NoFace).expect("serialize");
        assert_eq!(json, "\"no_face\"");
    }

    #[test]
    fn test_session_start_request_defaults() {
        let request: SessionStartRequest = serde_json::from_str("{}").expect("deserialize");
        assert!(request.duration_secs.is_none());
    }
}
