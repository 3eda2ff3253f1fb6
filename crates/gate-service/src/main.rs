use anyhow::Result;
use gate_service::capture::{
    run_gate_monitor, spawn_frame_producer, DirectoryFrameSource, FrameSlot,
};
use gate_service::clock::{Clock, SystemClock};
use gate_service::config::GateServiceConfig;
use gate_service::engine::GateEngine;
use gate_service::registry::{JsonVehicleRegistry, MemoryIdentityDirectory};
use gate_service::session::SessionTracker;
use gate_service::sink::{AccessLog, DirUnknownFaceSink, JsonlAccessLog};
use gate_service::verify::cache::ExtractionCache;
use gate_service::verify::face::FaceVerifier;
use gate_service::verify::mock::{MockFaceBackend, MockPlateExtractor};
use gate_service::verify::onnx::{OnnxFaceBackend, OnnxFaceConfig};
use gate_service::verify::plate::PlateVerifier;
use gate_service::verify::remote::HttpPlateExtractor;
use gate_service::verify::{FaceBackend, IdentityDirectory, PlateExtractor, VehicleRegistry};
use gate_service::{api, GateServiceState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_with_service("gate-service");

    info!("Starting gate service...");

    let config = GateServiceConfig::from_env()?;
    info!(
        "Gate service configuration: bind={}, node_id={}, data_dir={}",
        config.bind_addr,
        config.node_id,
        config.data_dir.display()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Stores and sinks
    let registry: Arc<dyn VehicleRegistry> = Arc::new(
        JsonVehicleRegistry::open(config.data_dir.join("registered_vehicles.json"), clock.clone())
            .await?,
    );
    let directory: Arc<dyn IdentityDirectory> = Arc::new(MemoryIdentityDirectory::new());
    let log: Arc<dyn AccessLog> =
        Arc::new(JsonlAccessLog::open(&config.data_dir.join("access_log.jsonl")).await?);
    let unknown_sink = Arc::new(DirUnknownFaceSink::new(config.data_dir.join("unknown_faces")));

    // External capabilities; mocks stand in when nothing is configured so
    // the service can be driven end to end without models.
    let face_backend: Arc<dyn FaceBackend> =
        match (&config.face_detection_model, &config.face_embedding_model) {
            (Some(detection), Some(embedding)) => {
                let backend =
                    OnnxFaceBackend::load(OnnxFaceConfig::new(detection.clone(), embedding.clone()))?;
                info!("face backend: ONNX models loaded");
                Arc::new(backend)
            }
            _ => {
                warn!("FACE_DETECTION_MODEL/FACE_EMBEDDING_MODEL not set - using mock face backend (demo mode)");
                let demo = directory
                    .add_identity("Demo User", "DEMO-1", "demo@example.com")
                    .await?;
                Arc::new(MockFaceBackend::known(demo.id, 40.0))
            }
        };

    let plate_extractor: Arc<dyn PlateExtractor> = match &config.plate_ocr_url {
        Some(url) => {
            info!(endpoint = %url, "plate extractor: HTTP OCR endpoint");
            Arc::new(HttpPlateExtractor::new(
                url.clone(),
                Duration::from_millis(config.control.plate_extract_timeout_ms),
            )?)
        }
        None => {
            warn!("PLATE_OCR_URL not set - using mock plate extractor (demo mode)");
            Arc::new(MockPlateExtractor::reading("DEMO123"))
        }
    };

    let face = FaceVerifier::new(
        face_backend,
        directory.clone(),
        unknown_sink,
        config.control.confidence_threshold,
        config.control.poor_match_threshold,
        clock.clone(),
    );
    let plate = PlateVerifier::new(
        plate_extractor,
        registry.clone(),
        ExtractionCache::new(config.control.plate_cache_timeout_secs, clock.clone()),
        Duration::from_millis(config.control.plate_extract_timeout_ms),
    );
    let engine = Arc::new(GateEngine::new(
        face,
        plate,
        SessionTracker::new(clock.clone()),
        log.clone(),
        clock,
        config.control.session_default_secs,
    ));

    // Optional live monitor: cycle still frames from a directory through a
    // session at startup. Failing to open the source is fatal, not retried.
    if let Some(frames_dir) = &config.frames_dir {
        let source =
            DirectoryFrameSource::open(std::path::Path::new(frames_dir), "gate-camera").await?;
        let session = engine.start_session(None).await?;
        let interval = Duration::from_millis(config.control.monitor_interval_ms);
        let slot = FrameSlot::new();
        let cancel = tokio_util::sync::CancellationToken::new();

        spawn_frame_producer(source, slot.clone(), interval, cancel.clone());

        let monitor_engine = engine.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            match run_gate_monitor(monitor_engine, session_id, slot, interval, cancel.clone()).await
            {
                Ok(summary) => info!(
                    session_id = %summary.session_id,
                    identities_admitted = summary.identities_admitted,
                    "monitor session finished"
                ),
                Err(e) => tracing::error!(error = %e, "monitor session failed"),
            }
            cancel.cancel();
        });
        info!(frames_dir = %frames_dir, session_id = %session.id, "live gate monitor started");
    }

    let state = GateServiceState::new(config.node_id, engine, directory, registry, log);
    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Gate service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
