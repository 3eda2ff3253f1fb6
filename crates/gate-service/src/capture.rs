//! Frame acquisition for live monitoring: a background producer feeds the
//! latest frame into a single-slot buffer and the monitor loop drains it.
//!
//! The slot is latest-wins: frames are disposable, so an undelivered frame
//! is simply overwritten. Staleness is acceptable, backlog is not.

use crate::engine::GateEngine;
use crate::error::GateError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use common::access::{SessionSummary, VideoFrame};
use common::validation::safe_unix_timestamp_ms;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Single-slot latest-wins frame buffer shared between the producer and
/// the monitor loop.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<VideoFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, overwriting any undelivered one. Returns true when
    /// a frame was dropped.
    pub fn publish(&self, frame: VideoFrame) -> bool {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = slot.is_some();
        if dropped {
            telemetry::metrics::GATE_FRAMES_DROPPED.inc();
        }
        *slot = Some(frame);
        dropped
    }

    /// Take the latest frame, leaving the slot empty.
    pub fn take(&self) -> Option<VideoFrame> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// A source of camera frames serviced by the producer task.
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or None when the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/// Cycles still images from a directory; stands in for a camera in demos
/// and tests. Opening fails with `CameraUnavailable` when the directory is
/// missing or holds no images.
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    index: usize,
    sequence: u64,
    source_id: String,
}

impl DirectoryFrameSource {
    pub async fn open(dir: &Path, source_id: &str) -> Result<Self, GateError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| GateError::CameraUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GateError::CameraUnavailable(format!("{}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(GateError::CameraUnavailable(format!(
                "no image frames in {}",
                dir.display()
            )));
        }

        Ok(Self {
            files,
            index: 0,
            sequence: 0,
            source_id: source_id.to_string(),
        })
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let path = self.files[self.index % self.files.len()].clone();
        self.index = (self.index + 1) % self.files.len();
        self.sequence += 1;

        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read frame {}", path.display()))?;

        let (width, height) = match image::load_from_memory(&bytes) {
            Ok(image) => (image.width(), image.height()),
            Err(_) => (0, 0),
        };

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_else(|| "jpeg".to_string());

        Ok(Some(VideoFrame {
            source_id: self.source_id.clone(),
            timestamp: safe_unix_timestamp_ms(),
            sequence: self.sequence,
            width,
            height,
            format,
            data: base64::prelude::BASE64_STANDARD.encode(&bytes),
        }))
    }
}

/// Spawn the dedicated capture producer. The decision loop never blocks on
/// acquisition latency; it only ever sees the most recent frame.
pub fn spawn_frame_producer(
    mut source: impl FrameSource + 'static,
    slot: FrameSlot,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("frame producer cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match source.next_frame().await {
                        Ok(Some(frame)) => {
                            if slot.publish(frame) {
                                debug!("overwrote undelivered frame");
                            }
                        }
                        Ok(None) => {
                            info!("frame source exhausted");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to acquire frame");
                        }
                    }
                }
            }
        }
    })
}

/// Drive a monitoring session from the frame slot until the deadline is
/// reached or the token cancels, then finalize. Cancellation only lands
/// between frames and the summary is always flushed.
pub async fn run_gate_monitor(
    engine: Arc<GateEngine>,
    session_id: String,
    slot: FrameSlot,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<SessionSummary, GateError> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(session_id, "gate monitor cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(frame) = slot.take() else {
                    continue;
                };

                match engine.process_frame(&session_id, &frame).await {
                    Ok(decision) => {
                        debug!(
                            session_id,
                            sequence = frame.sequence,
                            decision = %decision.decision,
                            "monitor decision"
                        );
                    }
                    Err(GateError::SessionExpired(_)) => {
                        info!(session_id, "session deadline reached");
                        break;
                    }
                    Err(e) => {
                        error!(session_id, error = %e, "monitor stopping on error");
                        break;
                    }
                }
            }
        }
    }

    engine.end_session(&session_id).await
}
