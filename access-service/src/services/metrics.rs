use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static BEST_EFFORT_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static RATE_LIMITED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SECURITY_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Builds the registry once per process. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let best_effort_failures = IntCounterVec::new(
        Opts::new(
            "best_effort_failures_total",
            "Side effects that failed without failing the request",
        ),
        &["operation"],
    )?;
    let rate_limited = IntCounterVec::new(
        Opts::new("rate_limited_total", "Requests rejected by a rate limit"),
        &["action"],
    )?;
    let security_events = IntCounterVec::new(
        Opts::new("security_events_total", "Security events recorded"),
        &["event_type"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(best_effort_failures.clone()))?;
    registry.register(Box::new(rate_limited.clone()))?;
    registry.register(Box::new(security_events.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = BEST_EFFORT_FAILURES_TOTAL.set(best_effort_failures);
    let _ = RATE_LIMITED_TOTAL.set(rate_limited);
    let _ = SECURITY_EVENTS_TOTAL.set(security_events);

    Ok(())
}

pub fn record_http_request(method: &str, path: &str, status: &str, seconds: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, path, status]).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path, status])
            .observe(seconds);
    }
}

pub fn record_best_effort_failure(operation: &str) {
    if let Some(counter) = BEST_EFFORT_FAILURES_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

pub fn record_rate_limited(action: &str) {
    if let Some(counter) = RATE_LIMITED_TOTAL.get() {
        counter.with_label_values(&[action]).inc();
    }
}

pub fn record_security_event(event_type: &str) {
    if let Some(counter) = SECURITY_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event_type]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
