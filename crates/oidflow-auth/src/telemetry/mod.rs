//! Server telemetry
//!
//! Each acquisition opens a [`ServerTelemetryManager`] keyed by its [`ApiId`]
//! and correlation id. The manager produces the two headers the token
//! endpoint reads:
//!
//! - `x-client-current-telemetry`: `5|{api_id},{force_refresh}|`
//! - `x-client-last-telemetry`: `5|{cache_hits}|{api_id,correlation_id,...}|{errors,...}|`
//!
//! Failures are recorded into a shared [`TelemetryStore`] so the *next*
//! request can report them. Entries that were reported are cleared once that
//! request gets a response from the server.

mod metrics;

pub use metrics::init_auth_metrics;
pub(crate) use metrics::{
    record_acquisition, record_cache_lookup, record_token_validation,
    record_token_validation_duration,
};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Header carrying telemetry for the current request
pub const CURRENT_TELEMETRY_HEADER: &str = "x-client-current-telemetry";
/// Header carrying failures of earlier requests
pub const LAST_TELEMETRY_HEADER: &str = "x-client-last-telemetry";

const SCHEMA_VERSION: u8 = 5;
const DEFAULT_MAX_FAILURES: usize = 50;

/// Public API that initiated a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiId {
    /// Silent acquisition from the cache or a refresh token
    AcquireTokenSilent,
    /// Authorization code redemption
    AcquireTokenByCode,
    /// Caller-supplied refresh token redemption
    AcquireTokenByRefreshToken,
    /// Resource owner password credentials
    AcquireTokenByUsernamePassword,
    /// Device authorization grant
    AcquireTokenByDeviceCode,
    /// Client credentials grant
    AcquireTokenByClientCredential,
}

impl ApiId {
    /// Numeric identifier reported in the telemetry headers
    pub fn code(self) -> u16 {
        match self {
            Self::AcquireTokenSilent => 863,
            Self::AcquireTokenByCode => 871,
            Self::AcquireTokenByRefreshToken => 872,
            Self::AcquireTokenByUsernamePassword => 371,
            Self::AcquireTokenByDeviceCode => 671,
            Self::AcquireTokenByClientCredential => 771,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::AcquireTokenSilent => "acquire_token_silent",
            Self::AcquireTokenByCode => "acquire_token_by_code",
            Self::AcquireTokenByRefreshToken => "acquire_token_by_refresh_token",
            Self::AcquireTokenByUsernamePassword => "acquire_token_by_username_password",
            Self::AcquireTokenByDeviceCode => "acquire_token_by_device_code",
            Self::AcquireTokenByClientCredential => "acquire_token_by_client_credential",
        }
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
struct FailedRequest {
    id: u64,
    api_id: u16,
    correlation_id: String,
    error: String,
}

#[derive(Debug, Default)]
struct StoreState {
    failures: VecDeque<FailedRequest>,
    cache_hits: u32,
    next_id: u64,
}

/// What one last-request header covered
#[derive(Debug, Default)]
struct Reported {
    failure_ids: Vec<u64>,
    cache_hits: u32,
}

// Commas and pipes are the header's separators
fn header_field(value: &str) -> String {
    value.replace([',', '|'], "_")
}

/// Failures waiting to be reported on the next request
///
/// Bounded: once full, the oldest failure is dropped.
#[derive(Debug)]
pub struct TelemetryStore {
    state: Mutex<StoreState>,
    max_failures: usize,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_FAILURES)
    }
}

impl TelemetryStore {
    /// Store keeping at most `max_failures` entries
    pub fn with_capacity(max_failures: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            max_failures: max_failures.max(1),
        }
    }

    /// Number of pending failures
    pub fn pending_failures(&self) -> usize {
        self.state.lock().failures.len()
    }

    /// Number of cache hits since the last successful report
    pub fn cache_hits(&self) -> u32 {
        self.state.lock().cache_hits
    }

    fn push_failure(&self, api_id: u16, correlation_id: &str, error: &str) {
        let mut state = self.state.lock();
        if state.failures.len() == self.max_failures {
            state.failures.pop_front();
        }
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.failures.push_back(FailedRequest {
            id,
            api_id,
            correlation_id: header_field(correlation_id),
            error: header_field(error),
        });
    }

    fn increment_cache_hits(&self) {
        let mut state = self.state.lock();
        state.cache_hits = state.cache_hits.saturating_add(1);
    }

    /// Render the last-request header along with what it covers
    fn last_request_header(&self) -> (String, Reported) {
        let state = self.state.lock();
        let requests = state
            .failures
            .iter()
            .map(|f| format!("{},{}", f.api_id, f.correlation_id))
            .collect::<Vec<_>>()
            .join(",");
        let errors = state
            .failures
            .iter()
            .map(|f| f.error.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let header = format!(
            "{SCHEMA_VERSION}|{}|{requests}|{errors}|",
            state.cache_hits
        );
        let reported = Reported {
            failure_ids: state.failures.iter().map(|f| f.id).collect(),
            cache_hits: state.cache_hits,
        };
        (header, reported)
    }

    /// Drop exactly the failures and cache hits a header reported
    fn clear_reported(&self, reported: Reported) {
        let mut state = self.state.lock();
        state
            .failures
            .retain(|f| !reported.failure_ids.contains(&f.id));
        state.cache_hits = state.cache_hits.saturating_sub(reported.cache_hits);
    }
}

/// Telemetry scope of a single acquisition
#[derive(Debug, Clone)]
pub struct ServerTelemetryManager {
    api_id: ApiId,
    correlation_id: String,
    force_refresh: bool,
    store: Arc<TelemetryStore>,
    reported: Arc<Mutex<Reported>>,
}

impl ServerTelemetryManager {
    /// Open a telemetry scope
    pub fn new(
        api_id: ApiId,
        correlation_id: impl Into<String>,
        force_refresh: bool,
        store: Arc<TelemetryStore>,
    ) -> Self {
        Self {
            api_id,
            correlation_id: correlation_id.into(),
            force_refresh,
            store,
            reported: Arc::new(Mutex::new(Reported::default())),
        }
    }

    /// API this scope belongs to
    pub fn api_id(&self) -> ApiId {
        self.api_id
    }

    /// Correlation id of the request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Value of `x-client-current-telemetry`
    pub fn current_request_header(&self) -> String {
        format!(
            "{SCHEMA_VERSION}|{},{}|",
            self.api_id.code(),
            u8::from(self.force_refresh)
        )
    }

    /// Value of `x-client-last-telemetry`
    ///
    /// Remembers which pending failures and how many cache hits were
    /// included so that [`clear_reported`](Self::clear_reported) only drops
    /// those.
    pub fn last_request_header(&self) -> String {
        let (header, reported) = self.store.last_request_header();
        *self.reported.lock() = reported;
        header
    }

    /// Record a failure of this request for the next request to report
    pub fn cache_failed_request(&self, error_code: &str) {
        self.store
            .push_failure(self.api_id.code(), &self.correlation_id, error_code);
    }

    /// Count a token served from the cache
    pub fn increment_cache_hits(&self) {
        self.store.increment_cache_hits();
    }

    /// Drop the failures reported by this request's last-request header
    pub fn clear_reported(&self) {
        let reported = std::mem::take(&mut *self.reported.lock());
        self.store.clear_reported(reported);
    }
}
