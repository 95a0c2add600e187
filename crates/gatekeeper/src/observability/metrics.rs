//! Metrics definitions for the gatekeeper.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gk_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `status`: `success`, `error` or `timeout`
//! - `error_type`: bounded by `AuthError` variants
//!
//! Request paths are deliberately not a label; registered routes are
//! application-defined.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gk_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetches cross the network to the identity provider
        .set_buckets_for_metric(
            Matcher::Prefix("gk_jwks_fetch".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gk_http_requests_total`, `gk_http_request_duration_seconds`
/// Labels: `method`, `status` / `status_code`
pub fn record_http_request(method: &str, status_code: u16, duration: Duration) {
    let status = categorize_status_code(status_code);

    histogram!("gk_http_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gk_http_requests_total",
        "method" => method.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a JWKS fetch.
///
/// Metric: `gk_jwks_fetch_total`, `gk_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("gk_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gk_jwks_fetch_total", "status" => status).increment(1);
}

/// Record a forced JWKS cache invalidation.
///
/// Metric: `gk_jwks_reloads_total`
pub fn record_jwks_reload() {
    counter!("gk_jwks_reloads_total").increment(1);
}

/// Record a token validation outcome.
///
/// Metric: `gk_token_validations_total`
/// Labels: `status`, `error_type` (`none` on success)
pub fn record_token_validation(status: &'static str, error_type: Option<&'static str>) {
    counter!("gk_token_validations_total",
        "status" => status,
        "error_type" => error_type.unwrap_or("none")
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_recorded_metric_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_http_request("GET", 200, Duration::from_millis(5));
            record_http_request("GET", 401, Duration::from_millis(1));
            record_jwks_fetch("success", Duration::from_millis(40));
            record_jwks_reload();
            record_token_validation("success", None);
            record_token_validation("error", Some("invalid_audience"));
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "gk_http_requests_total",
            "gk_http_request_duration_seconds",
            "gk_jwks_fetch_total",
            "gk_jwks_fetch_duration_seconds",
            "gk_jwks_reloads_total",
            "gk_token_validations_total",
        ] {
            assert!(
                names.iter().any(|name| name == expected),
                "missing metric {expected}, got {names:?}"
            );
        }
    }

    #[test]
    fn test_reload_counter_increments() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_jwks_reload();
            record_jwks_reload();
        });

        let reloads = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key.key().name() == "gk_jwks_reloads_total")
            .map(|(_, _, _, value)| value);

        assert_eq!(reloads, Some(DebugValue::Counter(2)));
    }
}
