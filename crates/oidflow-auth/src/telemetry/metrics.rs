//! Acquisition and validation metrics
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `oidflow_token_acquisitions_total` - Counter for acquisition attempts (labels: api, status)
//! - `oidflow_token_validations_total` - Counter for token validations (labels: status)
//! - `oidflow_token_validation_duration_seconds` - Histogram for validation duration
//! - `oidflow_cache_lookups_total` - Counter for silent-flow cache lookups (labels: result)

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

use super::ApiId;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Call once at startup.
///
/// Idempotent; only the first call registers the descriptions.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "oidflow_token_acquisitions_total",
            "Total token acquisition attempts (success and failure)"
        );
        describe_counter!(
            "oidflow_token_validations_total",
            "Total token validation attempts"
        );
        describe_counter!(
            "oidflow_cache_lookups_total",
            "Silent flow token cache lookups"
        );
        describe_histogram!(
            "oidflow_token_validation_duration_seconds",
            "Token validation duration in seconds"
        );
    });
}

/// Record a token acquisition attempt
#[cfg(feature = "metrics")]
pub(crate) fn record_acquisition(api_id: ApiId, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "oidflow_token_acquisitions_total",
        "api" => api_id.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a token validation attempt
#[cfg(feature = "metrics")]
pub(crate) fn record_token_validation(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("oidflow_token_validations_total", "status" => status).increment(1);
}

/// Record token validation duration
#[cfg(feature = "metrics")]
pub(crate) fn record_token_validation_duration(duration_seconds: f64) {
    histogram!("oidflow_token_validation_duration_seconds").record(duration_seconds);
}

/// Record a silent flow cache lookup
#[cfg(feature = "metrics")]
pub(crate) fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("oidflow_cache_lookups_total", "result" => result).increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub(crate) fn record_acquisition(_api_id: ApiId, _success: bool) {}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub(crate) fn record_token_validation(_success: bool) {}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub(crate) fn record_token_validation_duration(_duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub(crate) fn record_cache_lookup(_hit: bool) {}
