use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Store Metrics
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of store operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Store operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    pub static ref TRANSACTION_REPLAYS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "transaction_replays_total",
        "Transactions replayed after a write conflict",
        &["operation"]
    )
    .unwrap();

    // Business Metrics
    pub static ref LESSONS_COMPLETED_TOTAL: IntCounter = register_int_counter!(
        "lessons_completed_total",
        "Lessons newly marked complete"
    )
    .unwrap();

    pub static ref ENROLLMENTS_COMPLETED_TOTAL: IntCounter = register_int_counter!(
        "enrollments_completed_total",
        "Enrollments that reached the completed status"
    )
    .unwrap();

    pub static ref QUIZ_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_attempts_total",
        "Total number of graded quiz attempts",
        &["perfect"]
    )
    .unwrap();

    pub static ref POINTS_AWARDED_TOTAL: IntCounter = register_int_counter!(
        "points_awarded_total",
        "Sum of all points awarded"
    )
    .unwrap();

    pub static ref BADGE_PROMOTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "badge_promotions_total",
        "Badge changes by the badge reached",
        &["badge"]
    )
    .unwrap();

    pub static ref ENGINE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "engine_errors_total",
        "Engine operations rejected or failed, by error kind",
        &["operation", "kind"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track store operation with metrics
pub async fn track_store_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_engine_error(operation: &str, err: &crate::error::EngineError) {
    ENGINE_ERRORS_TOTAL
        .with_label_values(&[operation, err.kind()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = LESSONS_COMPLETED_TOTAL.get();
    }

    #[test]
    fn test_render_metrics() {
        BADGE_PROMOTIONS_TOTAL.with_label_values(&["explorer"]).inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("badge_promotions_total"));
    }

    #[tokio::test]
    async fn track_store_operation_passes_result_through() {
        let ok: Result<u32, String> =
            track_store_operation("find", "test_collection", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            track_store_operation("find", "test_collection", async { Err("boom".to_string()) })
                .await;
        assert!(err.is_err());
        assert!(
            STORE_OPERATIONS_TOTAL
                .with_label_values(&["find", "test_collection", "error"])
                .get()
                >= 1
        );
    }
}
