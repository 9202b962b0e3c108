//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels (pretty or JSON)
//! - Metrics collection with a Prometheus recorder
//! - Span helpers and metric recording functions used by the server and OCR code
//!
//! Card numbers and CVCs never reach logs or metrics, only field presence.

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;
use crate::text_processing::ExtractedCard;

/// Initialize logging and, when enabled, the Prometheus recorder
///
/// Returns the handle used by `GET /metrics`.
pub fn init_observability(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    let metrics_handle = if config.enable_metrics_export {
        Some(init_metrics()?)
    } else {
        tracing::info!("Metrics export disabled");
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = %config.enable_metrics_export,
        "Observability stack initialized successfully"
    );
    Ok(metrics_handle)
}

/// Initialize structured logging with tracing and configuration
fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("card_ocr={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("hyper=warn".parse()?);

    if config.use_pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the global Prometheus recorder
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str, engine: &str) -> tracing::Span {
    tracing::info_span!(
        "ocr_operation",
        operation = operation,
        engine = engine,
        component = "ocr"
    )
}

/// Create a span for a single HTTP request
pub fn http_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = method,
        path = path,
        component = "http"
    )
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(success: bool, duration: std::time::Duration, image_size: u64) {
    metrics::counter!("ocr_operations_total", "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record how many OCR workers are idle
pub fn record_worker_availability(available: usize, capacity: usize) {
    metrics::gauge!("ocr_workers_available").set(available as f64);
    metrics::gauge!("ocr_workers_capacity").set(capacity as f64);
}

/// Record which card fields were recognized
pub fn record_card_fields(card: &ExtractedCard) {
    let fields = [
        ("card_number", card.card_number.is_some()),
        ("expiry", card.expire_mm.is_some()),
        ("cvc", card.cvc.is_some()),
    ];
    for (field, present) in fields {
        if present {
            metrics::counter!("card_fields_extracted_total", "field" => field).increment(1);
        }
    }
    if card.is_empty() {
        metrics::counter!("card_extractions_empty_total").increment(1);
    }
}

/// Record request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: std::time::Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("http_requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record error rate metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record application startup metrics
pub fn record_startup_metrics(duration: std::time::Duration) {
    metrics::histogram!("application_startup_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("application_starts_total").increment(1);
}
