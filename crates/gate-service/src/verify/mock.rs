//! Deterministic stand-in backends used in demo mode and tests.

use super::{FaceBackend, FaceCandidate, PlateExtractor};
use crate::error::GateError;
use anyhow::Result;
use async_trait::async_trait;
use common::access::FaceRegion;
use image::DynamicImage;

/// Face backend that always reports the same candidate (or no face at all).
pub struct MockFaceBackend {
    trained: bool,
    region: Option<FaceRegion>,
    candidate: Option<FaceCandidate>,
}

impl MockFaceBackend {
    /// One face region matching `identity_id` at the given distance.
    pub fn known(identity_id: u32, distance: f32) -> Self {
        Self {
            trained: true,
            region: Some(FaceRegion {
                x: 16,
                y: 16,
                width: 48,
                height: 48,
            }),
            candidate: Some(FaceCandidate {
                identity_id,
                distance,
            }),
        }
    }

    /// No face regions in any frame.
    pub fn no_face() -> Self {
        Self {
            trained: true,
            region: None,
            candidate: None,
        }
    }

    /// A backend with no trained model artifact.
    pub fn untrained() -> Self {
        Self {
            trained: false,
            region: Some(FaceRegion {
                x: 16,
                y: 16,
                width: 48,
                height: 48,
            }),
            candidate: None,
        }
    }
}

#[async_trait]
impl FaceBackend for MockFaceBackend {
    fn is_trained(&self) -> bool {
        self.trained
    }

    async fn detect_faces(&self, _image: &DynamicImage) -> Result<Vec<FaceRegion>> {
        Ok(self.region.into_iter().collect())
    }

    async fn match_face(&self, _face: &DynamicImage) -> Result<FaceCandidate, GateError> {
        if !self.trained {
            return Err(GateError::ModelNotTrained);
        }
        self.candidate
            .ok_or_else(|| GateError::ExternalService("mock backend has no candidate".into()))
    }
}

/// Plate extractor that always reads the same text.
pub struct MockPlateExtractor {
    plate: Option<String>,
}

impl MockPlateExtractor {
    pub fn reading(plate: &str) -> Self {
        Self {
            plate: Some(plate.to_string()),
        }
    }

    pub fn none() -> Self {
        Self { plate: None }
    }
}

#[async_trait]
impl PlateExtractor for MockPlateExtractor {
    async fn extract_plate_text(&self, _image: &[u8]) -> Result<Option<String>> {
        Ok(self.plate.clone())
    }
}
