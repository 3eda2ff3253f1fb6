use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Gate Decision Metrics ====
    pub static ref GATE_DECISIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "gate_decisions_total",
                "Total number of gate decisions by outcome and reason",
            ),
            &["decision", "reason"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref GATE_DECISION_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "gate_decision_latency_seconds",
                "Time spent producing a gate decision for one frame",
            )
            .buckets(vec![0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref GATE_FIRST_GRANTS: IntCounter = {
        let metric = IntCounter::new(
            "gate_first_grants_total",
            "Total number of first admissions recorded across sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Session Metrics ====
    pub static ref GATE_ACTIVE_SESSIONS: IntGauge = {
        let metric = IntGauge::new(
            "gate_active_sessions",
            "Number of monitoring sessions currently running",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Plate Verifier Metrics ====
    pub static ref GATE_PLATE_CACHE: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "gate_plate_cache_total",
                "Plate extraction cache lookups by result",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref GATE_PLATE_EXTRACTION_FAILURES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "gate_plate_extraction_failures_total",
                "Plate extraction calls that failed or timed out",
            ),
            &["kind"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Face Verifier Metrics ====
    pub static ref GATE_UNKNOWN_FACE_CAPTURES: IntCounter = {
        let metric = IntCounter::new(
            "gate_unknown_face_captures_total",
            "Poor-match face regions captured for later review",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Frame Buffer Metrics ====
    pub static ref GATE_FRAMES_DROPPED: IntCounter = {
        let metric = IntCounter::new(
            "gate_frames_dropped_total",
            "Undelivered frames overwritten in the latest-wins buffer",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render all registered metrics in Prometheus text exposition format.
pub fn gather() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_render() {
        GATE_DECISIONS
            .with_label_values(&["denied", "no_face_detected"])
            .inc();
        GATE_FRAMES_DROPPED.inc();

        let rendered = gather();
        assert!(rendered.contains("gate_decisions_total"));
        assert!(rendered.contains("gate_frames_dropped_total"));
    }
}
