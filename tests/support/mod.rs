#![allow(dead_code)]

use base64::Engine;
use chrono::Utc;
use common::access::{Identity, VideoFrame};
use gate_service::clock::ManualClock;
use gate_service::engine::GateEngine;
use gate_service::registry::{MemoryIdentityDirectory, MemoryVehicleRegistry};
use gate_service::session::SessionTracker;
use gate_service::sink::{MemoryAccessLog, MemoryUnknownFaceSink};
use gate_service::state::GateServiceState;
use gate_service::verify::cache::ExtractionCache;
use gate_service::verify::face::FaceVerifier;
use gate_service::verify::plate::PlateVerifier;
use gate_service::verify::{FaceBackend, IdentityDirectory, PlateExtractor, VehicleRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Per-frame bound on plate extraction in tests; slow fakes sleep well past it.
pub const TEST_PLATE_TIMEOUT: Duration = Duration::from_millis(100);

/// A fully wired engine over in-memory stores, a manual clock, and the
/// supplied capability fakes. "Alice" and plate "AB123CD" are pre-registered.
pub struct GateFixture {
    pub engine: Arc<GateEngine>,
    pub log: Arc<MemoryAccessLog>,
    pub unknown_sink: Arc<MemoryUnknownFaceSink>,
    pub directory: Arc<MemoryIdentityDirectory>,
    pub registry: Arc<MemoryVehicleRegistry>,
    pub clock: ManualClock,
    pub alice: Identity,
}

pub async fn fixture(
    face_backend: impl FaceBackend + 'static,
    plate_extractor: impl PlateExtractor + 'static,
) -> GateFixture {
    let clock = ManualClock::new(Utc::now());
    let clock_arc: Arc<dyn gate_service::clock::Clock> = Arc::new(clock.clone());

    let directory = Arc::new(MemoryIdentityDirectory::with_clock(clock_arc.clone()));
    let alice = directory
        .add_identity("Alice", "ID-1", "alice@example.com")
        .await
        .expect("register identity");

    let registry = Arc::new(MemoryVehicleRegistry::new(clock_arc.clone()));
    let outcome = registry.register("AB123CD").await.expect("register vehicle");
    assert!(outcome.success);

    let log = Arc::new(MemoryAccessLog::new());
    let unknown_sink = Arc::new(MemoryUnknownFaceSink::new());

    let face = FaceVerifier::new(
        Arc::new(face_backend),
        directory.clone(),
        unknown_sink.clone(),
        50.0,
        75.0,
        clock_arc.clone(),
    );
    let plate = PlateVerifier::new(
        Arc::new(plate_extractor),
        registry.clone(),
        ExtractionCache::new(60, clock_arc.clone()),
        TEST_PLATE_TIMEOUT,
    );

    let engine = Arc::new(GateEngine::new(
        face,
        plate,
        SessionTracker::new(clock_arc.clone()),
        log.clone(),
        clock_arc,
        20,
    ));

    GateFixture {
        engine,
        log,
        unknown_sink,
        directory,
        registry,
        clock,
        alice,
    }
}

impl GateFixture {
    /// Router state over this fixture, for API-level tests.
    pub fn service_state(&self) -> GateServiceState {
        GateServiceState::new(
            "gate-service-test".to_string(),
            self.engine.clone(),
            self.directory.clone(),
            self.registry.clone(),
            self.log.clone(),
        )
    }
}

/// A small decodable PNG frame.
pub fn test_frame(sequence: u64) -> VideoFrame {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(64, 64));
    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .expect("encode test frame");

    VideoFrame {
        source_id: "cam-1".to_string(),
        timestamp: 0,
        sequence,
        width: 64,
        height: 64,
        format: "png".to_string(),
        data: base64::prelude::BASE64_STANDARD.encode(&png),
    }
}

/// A frame whose payload is not a decodable image.
pub fn garbage_frame(sequence: u64) -> VideoFrame {
    VideoFrame {
        source_id: "cam-1".to_string(),
        timestamp: 0,
        sequence,
        width: 0,
        height: 0,
        format: "jpeg".to_string(),
        data: "!!! definitely not base64 !!!".to_string(),
    }
}
