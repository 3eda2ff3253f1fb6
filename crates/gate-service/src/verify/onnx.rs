//! ONNX Runtime face backend: a detection model locating face regions and
//! an embedding model whose vectors are matched against enrolled identities.
//!
//! Matching reports a distance score (lower is better): the best cosine
//! similarity against the enrolled set, mapped to `(1 - similarity) * 100`
//! so the 0-100 thresholds in the gate configuration apply directly.

use super::{FaceBackend, FaceCandidate};
use crate::error::GateError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::access::FaceRegion;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::CPUExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxFaceConfig {
    /// Path to the face detection ONNX model file
    pub detection_model_path: String,

    /// Path to the face embedding ONNX model file
    pub embedding_model_path: String,

    /// Confidence threshold for face detections (0.0 to 1.0)
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of faces to keep per frame
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,

    /// Detection model input size (width and height)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Embedding model input size (width and height)
    #[serde(default = "default_embedding_input_size")]
    pub embedding_input_size: u32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_detection_confidence() -> f32 {
    0.6
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_faces() -> usize {
    16
}

fn default_detection_input_size() -> u32 {
    640
}

fn default_embedding_input_size() -> u32 {
    112
}

fn default_intra_threads() -> usize {
    4
}

impl OnnxFaceConfig {
    pub fn new(detection_model_path: impl Into<String>, embedding_model_path: impl Into<String>) -> Self {
        Self {
            detection_model_path: detection_model_path.into(),
            embedding_model_path: embedding_model_path.into(),
            detection_confidence: default_detection_confidence(),
            iou_threshold: default_iou_threshold(),
            max_faces: default_max_faces(),
            detection_input_size: default_detection_input_size(),
            embedding_input_size: default_embedding_input_size(),
            intra_threads: default_intra_threads(),
        }
    }
}

pub struct OnnxFaceBackend {
    config: OnnxFaceConfig,
    detector: Mutex<Session>,
    embedder: Mutex<Session>,
    /// Enrolled embeddings: identity id -> L2-normalized vector
    enrolled: RwLock<HashMap<u32, Vec<f32>>>,
}

impl OnnxFaceBackend {
    pub fn load(config: OnnxFaceConfig) -> Result<Self> {
        let detector = build_session(&config.detection_model_path, config.intra_threads)?;
        tracing::info!(path = %config.detection_model_path, "loaded face detection model");

        let embedder = build_session(&config.embedding_model_path, config.intra_threads)?;
        tracing::info!(path = %config.embedding_model_path, "loaded face embedding model");

        Ok(Self {
            config,
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            enrolled: RwLock::new(HashMap::new()),
        })
    }

    /// Enroll (or re-enroll) an identity from stored face samples. The
    /// embeddings of all samples are averaged and re-normalized.
    pub async fn enroll_identity(&self, identity_id: u32, samples: &[DynamicImage]) -> Result<usize> {
        if samples.is_empty() {
            return Err(anyhow!("no samples provided for identity {}", identity_id));
        }

        let mut sum: Vec<f32> = Vec::new();
        for sample in samples {
            let embedding = self.embed(sample).await?;
            if sum.is_empty() {
                sum = embedding;
            } else {
                for (acc, value) in sum.iter_mut().zip(embedding.iter()) {
                    *acc += value;
                }
            }
        }
        l2_normalize(&mut sum);

        self.enrolled
            .write()
            .map_err(|e| anyhow!("failed to lock enrolled embeddings: {}", e))?
            .insert(identity_id, sum);

        tracing::info!(identity_id, samples = samples.len(), "enrolled identity");
        Ok(samples.len())
    }

    pub fn enrolled_count(&self) -> usize {
        self.enrolled
            .read()
            .map(|enrolled| enrolled.len())
            .unwrap_or(0)
    }

    async fn embed(&self, face: &DynamicImage) -> Result<Vec<f32>> {
        let size = self.config.embedding_input_size;
        let input = rgb_tensor(face, size, true);
        let input_tensor = Value::from_array(input)?;

        let mut session = self.embedder.lock().await;
        let outputs = session.run(ort::inputs![input_tensor])?;

        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("embedding"))
            .context("no embedding output tensor found")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        if dims.len() != 2 || dims[0] != 1 {
            return Err(anyhow!("unexpected embedding output shape: {:?}", dims));
        }

        let mut embedding = data.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl FaceBackend for OnnxFaceBackend {
    fn is_trained(&self) -> bool {
        self.enrolled_count() > 0
    }

    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<FaceRegion>> {
        let size = self.config.detection_input_size;
        let input = rgb_tensor(image, size, false);
        let input_tensor = Value::from_array(input)?;

        let mut session = self.detector.lock().await;
        let outputs = session.run(ort::inputs![input_tensor])?;

        let output_value = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .or_else(|| outputs.get("boxes"))
            .context("no detection output tensor found")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&dims), data.to_vec())?;

        let scale_x = image.width() as f32 / size as f32;
        let scale_y = image.height() as f32 / size as f32;

        // Model output format: [batch, 5, num_predictions] (cx, cy, w, h, score)
        let num_predictions = output.shape()[2];
        let mut boxes = Vec::new();
        for i in 0..num_predictions {
            let score = output[[0, 4, i]];
            if score < self.config.detection_confidence {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let region = FaceRegion {
                x: ((cx - w / 2.0) * scale_x).max(0.0) as u32,
                y: ((cy - h / 2.0) * scale_y).max(0.0) as u32,
                width: (w * scale_x).min(image.width() as f32) as u32,
                height: (h * scale_y).min(image.height() as f32) as u32,
            };
            boxes.push((region, score));
        }

        let kept = non_max_suppression(boxes, self.config.iou_threshold);
        Ok(kept
            .into_iter()
            .take(self.config.max_faces)
            .map(|(region, _)| region)
            .collect())
    }

    async fn match_face(&self, face: &DynamicImage) -> Result<FaceCandidate, GateError> {
        let enrolled: Vec<(u32, Vec<f32>)> = {
            let guard = self
                .enrolled
                .read()
                .map_err(|e| GateError::ExternalService(format!("embedding lock poisoned: {}", e)))?;
            if guard.is_empty() {
                return Err(GateError::ModelNotTrained);
            }
            guard.iter().map(|(id, v)| (*id, v.clone())).collect()
        };

        let embedding = self
            .embed(face)
            .await
            .map_err(|e| GateError::ExternalService(format!("embedding extraction failed: {}", e)))?;

        let mut best_id = enrolled[0].0;
        let mut best_similarity = f32::MIN;
        for (identity_id, reference) in &enrolled {
            let similarity = cosine_similarity(&embedding, reference);
            if similarity > best_similarity {
                best_similarity = similarity;
                best_id = *identity_id;
            }
        }

        Ok(FaceCandidate {
            identity_id: best_id,
            distance: similarity_to_distance(best_similarity),
        })
    }
}

fn build_session(model_path: &str, intra_threads: usize) -> Result<Session> {
    Session::builder()
        .context("failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("failed to set intra threads")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("failed to set execution providers")?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load model from {}", model_path))
}

/// NCHW tensor from an image, resized square. Zero-centered maps pixels to
/// [-1, 1] (embedding models); otherwise [0, 1] (detection models).
fn rgb_tensor(img: &DynamicImage, size: u32, zero_centered: bool) -> Array<f32, IxDyn> {
    let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            let value = if zero_centered {
                (pixel[channel] as f32 / 127.5) - 1.0
            } else {
                pixel[channel] as f32 / 255.0
            };
            input[[0, channel, y as usize, x as usize]] = value;
        }
    }
    input
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    // Both sides are L2-normalized, so the dot product is the similarity.
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn similarity_to_distance(similarity: f32) -> f32 {
    ((1.0 - similarity) * 100.0).max(0.0)
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = ((x2 - x1) * (y2 - y1)) as f32;
    let union = (a.width * a.height + b.width * b.height) as f32 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn non_max_suppression(
    mut boxes: Vec<(FaceRegion, f32)>,
    iou_threshold: f32,
) -> Vec<(FaceRegion, f32)> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<(FaceRegion, f32)> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|(region, _)| iou(region, &candidate.0) < iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
