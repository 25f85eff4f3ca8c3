use concierge_core::DegradationMode;
use concierge_resilience::observability::metrics::{
    init_metrics, render_metrics, BREAKER_REJECTIONS, BREAKER_TRANSITIONS, DEAD_LETTER_ENTRIES,
    DEGRADATION_MODE,
};
use concierge_resilience::{CircuitBreaker, CircuitBreakerConfig, DeadLetterQueue, DegradationController};
use serde_json::json;
use std::collections::BTreeMap;

// The Prometheus recorder is process-global, so everything that depends on it
// lives in this one test.
#[tokio::test]
async fn test_components_emit_prometheus_series() {
    init_metrics().unwrap();
    // A second install is a no-op
    init_metrics().unwrap();

    let breaker = CircuitBreaker::new(
        "metrics_probe",
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        },
    );
    let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
    let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;

    let queue = DeadLetterQueue::with_max_size("metrics_queue", 5);
    queue.add(json!({"n": 1}), "boom", None, BTreeMap::new());

    DegradationController::default().set_mode(DegradationMode::Offline);

    let exposition = render_metrics().unwrap();
    for series in [
        BREAKER_TRANSITIONS,
        BREAKER_REJECTIONS,
        DEAD_LETTER_ENTRIES,
        DEGRADATION_MODE,
    ] {
        assert!(exposition.contains(series), "missing {series} in:\n{exposition}");
    }
    assert!(exposition.contains(r#"breaker="metrics_probe""#));
    assert!(exposition.contains(r#"queue="metrics_queue""#));
}
