//! Plate-text extraction backed by an external OCR/AI HTTP endpoint.
//!
//! The endpoint does its own preprocessing and stabilization; this adapter
//! only ships the frame and interprets the reply. A `NO_PLATE_DETECTED`
//! sentinel (or an empty reply) maps to "no plate found".

use super::PlateExtractor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const NO_PLATE_SENTINEL: &str = "NO_PLATE_DETECTED";

#[derive(Debug, Deserialize)]
struct PlateOcrResponse {
    plate_text: Option<String>,
}

pub struct HttpPlateExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPlateExtractor {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build plate OCR client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn interpret(text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == NO_PLATE_SENTINEL {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[async_trait]
impl PlateExtractor for HttpPlateExtractor {
    async fn extract_plate_text(&self, image: &[u8]) -> Result<Option<String>> {
        let payload = json!({
            "image": base64::prelude::BASE64_STANDARD.encode(image),
            "format": "jpeg",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("plate OCR request failed")?
            .error_for_status()
            .context("plate OCR returned an error status")?;

        let body: PlateOcrResponse = response
            .json()
            .await
            .context("invalid plate OCR response body")?;

        Ok(body.plate_text.as_deref().and_then(Self::interpret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_plate_text() {
        assert_eq!(
            HttpPlateExtractor::interpret(" KA01AB1234 "),
            Some("KA01AB1234".to_string())
        );
        assert_eq!(HttpPlateExtractor::interpret("NO_PLATE_DETECTED"), None);
        assert_eq!(HttpPlateExtractor::interpret("   "), None);
        assert_eq!(HttpPlateExtractor::interpret(""), None);
    }

    #[test]
    fn test_response_body_shape() {
        let body: PlateOcrResponse =
            serde_json::from_str(r#"{"plate_text": "AB123CD"}"#).expect("deserialize");
        assert_eq!(body.plate_text.as_deref(), Some("AB123CD"));

        let empty: PlateOcrResponse = serde_json::from_str(r#"{}"#).expect("deserialize");
        assert!(empty.plate_text.is_none());
    }
}
