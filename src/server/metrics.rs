use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all car name catalog metrics
const PREFIX: &str = "car_name_catalog";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Sync Metrics
    pub static ref SYNC_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_sync_runs_total"), "Car name sync runs by outcome"),
        &["outcome"]
    ).expect("Failed to create sync_runs_total metric");

    pub static ref SYNC_MERGED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_sync_merged_total"), "Fetched car names merged into the catalog"),
        &["result"]
    ).expect("Failed to create sync_merged_total metric");

    pub static ref SYNC_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_sync_duration_seconds"),
            "Duration of sync runs that held the lock"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0])
    ).expect("Failed to create sync_duration_seconds metric");

    // Catalog Metrics
    pub static ref CATALOG_ENTRIES_TOTAL: Gauge = Gauge::new(
        format!("{PREFIX}_catalog_entries_total"),
        "Car names stored in the catalog"
    ).expect("Failed to create catalog_entries_total metric");

    // Validation Cache Metrics
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cache_lookups_total"), "Validation cache lookups by result"),
        &["result"]
    ).expect("Failed to create cache_lookups_total metric");

    pub static ref CACHE_ENTRIES: Gauge = Gauge::new(
        format!("{PREFIX}_cache_entries"),
        "Entries currently held by the validation cache"
    ).expect("Failed to create cache_entries metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions by status"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_MERGED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNC_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ENTRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record the end of a sync run. `outcome` is one of "completed", "skipped", "failed".
pub fn record_sync_run(outcome: &str) {
    SYNC_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a sync run that held the lock and merged the fetched list
pub fn record_sync_merge(inserted: usize, already_present: usize, duration: Duration) {
    SYNC_MERGED_TOTAL
        .with_label_values(&["inserted"])
        .inc_by(inserted as f64);
    SYNC_MERGED_TOTAL
        .with_label_values(&["already_present"])
        .inc_by(already_present as f64);
    SYNC_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_catalog_entries(count: usize) {
    CATALOG_ENTRIES_TOTAL.set(count as f64);
}

pub fn record_cache_hit() {
    CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_LOOKUPS_TOTAL.with_label_values(&["miss"]).inc();
}

pub fn set_cache_entries(count: usize) {
    CACHE_ENTRIES.set(count as f64);
}

/// Record a finished background job execution. `status` is one of "success",
/// "cancelled", "failed" or "panic".
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_exists(name: &str) -> bool {
        REGISTRY
            .gather()
            .iter()
            .any(|m| m.get_name() == format!("{PREFIX}_{name}"))
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request("GET", "/health", 200, Duration::from_millis(5));

        assert!(metric_exists("http_requests_total"));
    }

    #[test]
    fn test_record_sync_metrics() {
        init_metrics();

        record_sync_run("completed");
        record_sync_merge(2, 1, Duration::from_millis(120));

        assert!(metric_exists("sync_runs_total"));
        assert!(metric_exists("sync_merged_total"));
        let inserted = SYNC_MERGED_TOTAL.with_label_values(&["inserted"]).get();
        assert!(inserted >= 2.0);
    }

    #[test]
    fn test_record_background_job_execution_by_status() {
        init_metrics();

        for status in ["success", "cancelled", "failed", "panic"] {
            record_background_job_execution("metrics_test_job", status, Duration::from_millis(3));
        }

        assert!(metric_exists("background_job_executions_total"));
        for status in ["success", "cancelled", "failed", "panic"] {
            let count = BACKGROUND_JOB_EXECUTIONS_TOTAL
                .with_label_values(&["metrics_test_job", status])
                .get();
            assert!(count >= 1.0, "no executions recorded as {status}");
        }
    }

    #[test]
    fn test_record_cache_lookups() {
        init_metrics();

        record_cache_hit();
        record_cache_miss();

        assert!(metric_exists("cache_lookups_total"));
    }
}
