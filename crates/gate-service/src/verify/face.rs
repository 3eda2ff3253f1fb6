//! Face identity verifier: applies accept / reject / capture policy on top
//! of the external detector and matcher capabilities.

use super::{FaceBackend, IdentityDirectory, UnknownFaceSink};
use crate::clock::Clock;
use crate::error::GateError;
use common::access::{FaceMatchResult, FaceStatus, Identity};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome for one evaluated face region, carrying the resolved identity
/// record when the region cleared verification.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    pub result: FaceMatchResult,
    pub identity: Option<Identity>,
}

impl RegionOutcome {
    fn unknown(distance: f32) -> Self {
        Self {
            result: FaceMatchResult {
                status: FaceStatus::Unknown,
                identity_id: None,
                distance,
            },
            identity: None,
        }
    }
}

pub struct FaceVerifier {
    backend: Arc<dyn FaceBackend>,
    directory: Arc<dyn IdentityDirectory>,
    unknown_sink: Arc<dyn UnknownFaceSink>,
    confidence_threshold: f32,
    poor_match_threshold: f32,
    clock: Arc<dyn Clock>,
}

impl FaceVerifier {
    pub fn new(
        backend: Arc<dyn FaceBackend>,
        directory: Arc<dyn IdentityDirectory>,
        unknown_sink: Arc<dyn UnknownFaceSink>,
        confidence_threshold: f32,
        poor_match_threshold: f32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            directory,
            unknown_sink,
            confidence_threshold,
            poor_match_threshold,
            clock,
        }
    }

    /// Setup-time check: sessions must not start against an untrained matcher.
    pub fn ensure_ready(&self) -> Result<(), GateError> {
        if self.backend.is_trained() {
            Ok(())
        } else {
            Err(GateError::ModelNotTrained)
        }
    }

    /// Evaluate every detected face region independently, in detection order.
    /// An empty vec means no face was present. `ModelNotTrained` is the only
    /// error surfaced; any other backend failure degrades the affected
    /// region (or the whole frame, for detector failures) to unknown/no-face.
    pub async fn evaluate(&self, image: &DynamicImage) -> Result<Vec<RegionOutcome>, GateError> {
        let regions = match self.backend.detect_faces(image).await {
            Ok(regions) => regions,
            Err(e) => {
                warn!(error = %e, "face detection failed, treating frame as no-face");
                return Ok(Vec::new());
            }
        };

        let mut outcomes = Vec::with_capacity(regions.len());
        for region in regions {
            let face = image.crop_imm(region.x, region.y, region.width, region.height);

            let candidate = match self.backend.match_face(&face).await {
                Ok(candidate) => candidate,
                Err(GateError::ModelNotTrained) => return Err(GateError::ModelNotTrained),
                Err(e) => {
                    warn!(error = %e, "face match failed, treating region as unknown");
                    outcomes.push(RegionOutcome::unknown(f32::INFINITY));
                    continue;
                }
            };

            // Strict comparison: a distance equal to the threshold is rejected.
            if candidate.distance < self.confidence_threshold {
                outcomes.push(self.resolve_candidate(candidate.identity_id, candidate.distance).await);
            } else {
                if candidate.distance > self.poor_match_threshold {
                    self.capture_unknown(&face).await;
                }
                outcomes.push(RegionOutcome::unknown(candidate.distance));
            }
        }

        Ok(outcomes)
    }

    async fn resolve_candidate(&self, identity_id: u32, distance: f32) -> RegionOutcome {
        match self.directory.lookup_identity(identity_id).await {
            Ok(Some(identity)) => RegionOutcome {
                result: FaceMatchResult {
                    status: FaceStatus::Known,
                    identity_id: Some(identity_id),
                    distance,
                },
                identity: Some(identity),
            },
            Ok(None) => {
                debug!(identity_id, "matched identity missing from directory, downgrading to unknown");
                RegionOutcome::unknown(distance)
            }
            Err(e) => {
                warn!(identity_id, error = %e, "identity lookup failed, downgrading to unknown");
                RegionOutcome::unknown(distance)
            }
        }
    }

    async fn capture_unknown(&self, face: &DynamicImage) {
        let mut jpeg = Vec::new();
        if let Err(e) = face.write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg) {
            warn!(error = %e, "failed to encode unknown face region");
            return;
        }

        match self.unknown_sink.capture(&jpeg, self.clock.now()).await {
            Ok(()) => {
                telemetry::metrics::GATE_UNKNOWN_FACE_CAPTURES.inc();
            }
            Err(e) => warn!(error = %e, "failed to capture unknown face region"),
        }
    }
}
