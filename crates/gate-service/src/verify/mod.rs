//! Identity verification: capability traits consumed by the gate engine and
//! the two verifier adapters that apply decision policy on top of them.

pub mod cache;
pub mod face;
pub mod mock;
pub mod onnx;
pub mod plate;
pub mod remote;

use crate::error::GateError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::access::{FaceRegion, Identity, RegisteredVehicle, RegistrationOutcome};
use image::DynamicImage;

/// A face candidate proposed by the matcher. Distance is non-negative,
/// lower is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceCandidate {
    pub identity_id: u32,
    pub distance: f32,
}

/// External face detection and matching capability.
#[async_trait]
pub trait FaceBackend: Send + Sync {
    /// Whether a trained model artifact is available for matching.
    fn is_trained(&self) -> bool;

    /// Locate face regions in a frame.
    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<FaceRegion>>;

    /// Match a cropped face region against the enrolled identities.
    /// Fails with `GateError::ModelNotTrained` when no model artifact exists.
    async fn match_face(&self, face: &DynamicImage) -> Result<FaceCandidate, GateError>;
}

/// External plate-text extraction capability. Performs its own internal
/// preprocessing and returns None when no legible plate is found.
#[async_trait]
pub trait PlateExtractor: Send + Sync {
    async fn extract_plate_text(&self, image: &[u8]) -> Result<Option<String>>;
}

/// Lookup and registration of people.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn lookup_identity(&self, identity_id: u32) -> Result<Option<Identity>>;

    /// Register a person; an existing external_id returns the existing record.
    async fn add_identity(&self, name: &str, external_id: &str, email: &str) -> Result<Identity>;

    async fn list_identities(&self) -> Result<Vec<Identity>>;
}

/// Lookup and registration of vehicle plates. Writes are serialized with
/// respect to reads used by `lookup`.
#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn lookup(&self, plate: &str) -> Result<bool>;

    /// Register a plate; a duplicate is a non-error outcome.
    async fn register(&self, plate: &str) -> Result<RegistrationOutcome>;

    async fn remove(&self, plate: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<RegisteredVehicle>>;
}

/// Side channel receiving poor-match face regions for later review.
#[async_trait]
pub trait UnknownFaceSink: Send + Sync {
    async fn capture(&self, jpeg: &[u8], at: DateTime<Utc>) -> Result<()>;
}
