use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Decision-policy knobs for the gate engine.
///
/// The thresholds apply to the face matcher's distance score (non-negative,
/// lower is better): below `confidence_threshold` a region is accepted,
/// above `poor_match_threshold` it is additionally captured for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateControlConfig {
    /// Face distance below which a region counts as a known identity
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Face distance above which an unknown region is captured for review
    #[serde(default = "default_poor_match_threshold")]
    pub poor_match_threshold: f32,

    /// Default monitoring session budget in seconds
    #[serde(default = "default_session_secs")]
    pub session_default_secs: u64,

    /// Plate extraction cache window in seconds
    #[serde(default = "default_plate_cache_secs")]
    pub plate_cache_timeout_secs: u64,

    /// Per-frame bound on the external plate extraction call
    #[serde(default = "default_plate_timeout_ms")]
    pub plate_extract_timeout_ms: u64,

    /// Cadence of the monitor loop in milliseconds
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

fn default_confidence_threshold() -> f32 {
    50.0
}

fn default_poor_match_threshold() -> f32 {
    75.0
}

fn default_session_secs() -> u64 {
    20
}

fn default_plate_cache_secs() -> u64 {
    60
}

fn default_plate_timeout_ms() -> u64 {
    2500
}

fn default_monitor_interval_ms() -> u64 {
    500
}

impl Default for GateControlConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            poor_match_threshold: default_poor_match_threshold(),
            session_default_secs: default_session_secs(),
            plate_cache_timeout_secs: default_plate_cache_secs(),
            plate_extract_timeout_ms: default_plate_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl GateControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.confidence_threshold < 0.0 {
            bail!("confidence_threshold must be non-negative");
        }
        if self.poor_match_threshold <= self.confidence_threshold {
            bail!(
                "poor_match_threshold ({}) must be greater than confidence_threshold ({})",
                self.poor_match_threshold,
                self.confidence_threshold
            );
        }
        if self.session_default_secs == 0 {
            bail!("session_default_secs must be greater than zero");
        }
        Ok(())
    }
}

/// Service-level configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct GateServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this gate service instance
    pub node_id: String,

    /// Directory for the vehicle registry, audit log, and unknown-face captures
    pub data_dir: PathBuf,

    /// Decision-policy configuration
    pub control: GateControlConfig,

    /// Path to the face detection ONNX model (demo mock when absent)
    pub face_detection_model: Option<String>,

    /// Path to the face embedding ONNX model (demo mock when absent)
    pub face_embedding_model: Option<String>,

    /// Plate OCR endpoint URL (demo mock when absent)
    pub plate_ocr_url: Option<String>,

    /// Directory of still frames driving a live monitor session at startup
    pub frames_dir: Option<String>,
}

impl GateServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("GATE_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8085".to_string());

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "gate-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let data_dir = PathBuf::from(env::var("GATE_DATA_DIR").unwrap_or_else(|_| "data".to_string()));

        let mut control = GateControlConfig::default();
        if let Some(v) = parse_env::<f32>("GATE_CONFIDENCE_THRESHOLD")? {
            control.confidence_threshold = v;
        }
        if let Some(v) = parse_env::<f32>("GATE_POOR_MATCH_THRESHOLD")? {
            control.poor_match_threshold = v;
        }
        if let Some(v) = parse_env::<u64>("GATE_SESSION_DEFAULT_SECS")? {
            control.session_default_secs = v;
        }
        if let Some(v) = parse_env::<u64>("GATE_PLATE_CACHE_TIMEOUT_SECS")? {
            control.plate_cache_timeout_secs = v;
        }
        if let Some(v) = parse_env::<u64>("GATE_PLATE_EXTRACT_TIMEOUT_MS")? {
            control.plate_extract_timeout_ms = v;
        }
        if let Some(v) = parse_env::<u64>("GATE_MONITOR_INTERVAL_MS")? {
            control.monitor_interval_ms = v;
        }
        control.validate()?;

        Ok(Self {
            bind_addr,
            node_id,
            data_dir,
            control,
            face_detection_model: env::var("FACE_DETECTION_MODEL").ok(),
            face_embedding_model: env::var("FACE_EMBEDDING_MODEL").ok(),
            plate_ocr_url: env::var("PLATE_OCR_URL").ok(),
            frames_dir: env::var("GATE_FRAMES_DIR").ok(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => {
            let value = raw
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
