//! Metrics definitions for token verification.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vt_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `path`: 3 values (id_token, access_token, none)
//! - `outcome`: 3 values (success, fail, error)
//! - `operation`: 4 values (certs, id_token, token_info, userinfo)
//! - `status`: 3 values (success, error, timeout)

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a finished authentication attempt.
///
/// Metrics: `vt_auth_attempts_total`, `vt_auth_duration_seconds`
/// Labels: `path`, `outcome` (counter only)
pub fn record_auth_attempt(path: &'static str, outcome: &'static str, duration: Duration) {
    histogram!("vt_auth_duration_seconds", "path" => path).record(duration.as_secs_f64());

    counter!("vt_auth_attempts_total",
        "path" => path,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an outbound call to the identity provider.
///
/// Metrics: `vt_provider_requests_total`, `vt_provider_request_duration_seconds`
/// Labels: `operation`, `status` (counter only)
pub fn record_provider_request(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("vt_provider_request_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());

    counter!("vt_provider_requests_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
