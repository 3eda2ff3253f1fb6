//! Plate identity verifier: extraction (bounded, cached) plus registry lookup.
//! Every failure path degrades to "no plate" so a slow or broken extractor
//! can never stall or fail the frame loop.

use super::cache::ExtractionCache;
use super::{PlateExtractor, VehicleRegistry};
use common::access::PlateMatchResult;
use common::validation::normalize_plate;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct PlateVerifier {
    extractor: Arc<dyn PlateExtractor>,
    registry: Arc<dyn VehicleRegistry>,
    cache: ExtractionCache,
    extract_timeout: Duration,
}

impl PlateVerifier {
    pub fn new(
        extractor: Arc<dyn PlateExtractor>,
        registry: Arc<dyn VehicleRegistry>,
        cache: ExtractionCache,
        extract_timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            registry,
            cache,
            extract_timeout,
        }
    }

    pub async fn evaluate(&self, image: &[u8]) -> PlateMatchResult {
        let raw = match self.extract_cached(image).await {
            Some(text) => text,
            None => {
                return PlateMatchResult {
                    plate_text: None,
                    registered: false,
                }
            }
        };

        let plate = normalize_plate(&raw);
        if plate.is_empty() {
            return PlateMatchResult {
                plate_text: None,
                registered: false,
            };
        }

        let registered = match self.registry.lookup(&plate).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(plate = %plate, error = %e, "vehicle registry lookup failed, treating as unregistered");
                false
            }
        };

        PlateMatchResult {
            plate_text: Some(plate),
            registered,
        }
    }

    async fn extract_cached(&self, image: &[u8]) -> Option<String> {
        let key = ExtractionCache::fingerprint(image);

        if let Some(cached) = self.cache.get(key) {
            telemetry::metrics::GATE_PLATE_CACHE
                .with_label_values(&["hit"])
                .inc();
            return cached;
        }
        telemetry::metrics::GATE_PLATE_CACHE
            .with_label_values(&["miss"])
            .inc();

        match tokio::time::timeout(self.extract_timeout, self.extractor.extract_plate_text(image))
            .await
        {
            Ok(Ok(extracted)) => {
                // Cache successful extractions, including "no plate found".
                self.cache.insert(key, extracted.clone());
                extracted
            }
            Ok(Err(e)) => {
                warn!(error = %e, "plate extraction failed, treating as no plate");
                telemetry::metrics::GATE_PLATE_EXTRACTION_FAILURES
                    .with_label_values(&["error"])
                    .inc();
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.extract_timeout.as_millis() as u64,
                    "plate extraction timed out, treating as no plate"
                );
                telemetry::metrics::GATE_PLATE_EXTRACTION_FAILURES
                    .with_label_values(&["timeout"])
                    .inc();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::registry::MemoryVehicleRegistry;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtractor {
        calls: AtomicUsize,
        result: Option<String>,
    }

    impl CountingExtractor {
        fn new(result: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: result.map(|s| s.to_string()),
            })
        }
    }

    #[async_trait]
    impl PlateExtractor for CountingExtractor {
        async fn extract_plate_text(&self, _image: &[u8]) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct SlowExtractor;

    #[async_trait]
    impl PlateExtractor for SlowExtractor {
        async fn extract_plate_text(&self, _image: &[u8]) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some("AB123CD".to_string()))
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl PlateExtractor for FailingExtractor {
        async fn extract_plate_text(&self, _image: &[u8]) -> Result<Option<String>> {
            Err(anyhow!("backend unreachable"))
        }
    }

    async fn registry_with_plate(plate: &str) -> Arc<MemoryVehicleRegistry> {
        let registry = Arc::new(MemoryVehicleRegistry::new(Arc::new(SystemClock)));
        let outcome = registry.register(plate).await.expect("register");
        assert!(outcome.success);
        registry
    }

    #[tokio::test]
    async fn test_registered_plate_verifies() {
        let registry = registry_with_plate("AB123CD").await;
        let verifier = PlateVerifier::new(
            CountingExtractor::new(Some("AB123CD")),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_secs(1),
        );

        let result = verifier.evaluate(b"frame").await;
        assert_eq!(result.plate_text.as_deref(), Some("AB123CD"));
        assert!(result.registered);
    }

    #[tokio::test]
    async fn test_extraction_is_normalized_before_lookup() {
        let registry = registry_with_plate("AB123CD").await;
        let verifier = PlateVerifier::new(
            CountingExtractor::new(Some(" ab 123 cd ")),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_secs(1),
        );

        let result = verifier.evaluate(b"frame").await;
        assert_eq!(result.plate_text.as_deref(), Some("AB123CD"));
        assert!(result.registered);
    }

    #[tokio::test]
    async fn test_unregistered_plate_is_reported() {
        let registry = Arc::new(MemoryVehicleRegistry::new(Arc::new(SystemClock)));
        let verifier = PlateVerifier::new(
            CountingExtractor::new(Some("ZZ999")),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_secs(1),
        );

        let result = verifier.evaluate(b"frame").await;
        assert_eq!(result.plate_text.as_deref(), Some("ZZ999"));
        assert!(!result.registered);
    }

    #[tokio::test]
    async fn test_cache_skips_repeat_extraction_within_window() {
        let registry = registry_with_plate("AB123CD").await;
        let extractor = CountingExtractor::new(Some("AB123CD"));
        let verifier = PlateVerifier::new(
            extractor.clone(),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_secs(1),
        );

        verifier.evaluate(b"frame").await;
        verifier.evaluate(b"frame").await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        // A different frame misses the cache.
        verifier.evaluate(b"other-frame").await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_after_window() {
        let clock = ManualClock::new(Utc::now());
        let registry = registry_with_plate("AB123CD").await;
        let extractor = CountingExtractor::new(Some("AB123CD"));
        let verifier = PlateVerifier::new(
            extractor.clone(),
            registry,
            ExtractionCache::new(60, Arc::new(clock.clone())),
            Duration::from_secs(1),
        );

        verifier.evaluate(b"frame").await;
        clock.advance(chrono::Duration::seconds(61));
        verifier.evaluate(b"frame").await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_no_plate() {
        let registry = registry_with_plate("AB123CD").await;
        let verifier = PlateVerifier::new(
            Arc::new(SlowExtractor),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_millis(20),
        );

        let result = verifier.evaluate(b"frame").await;
        assert_eq!(result.plate_text, None);
        assert!(!result.registered);
    }

    #[tokio::test]
    async fn test_extractor_error_degrades_to_no_plate() {
        let registry = registry_with_plate("AB123CD").await;
        let verifier = PlateVerifier::new(
            Arc::new(FailingExtractor),
            registry,
            ExtractionCache::new(60, Arc::new(SystemClock)),
            Duration::from_secs(1),
        );

        let result = verifier.evaluate(b"frame").await;
        assert_eq!(result.plate_text, None);
        assert!(!result.registered);
    }
}
