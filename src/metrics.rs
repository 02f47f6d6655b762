// Prometheus metrics definitions for the build leaderboard backend.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Decode pipeline ──────────────────────────────────────────────

    /// Builds run through the decoder.
    pub static ref BUILDS_DECODED_TOTAL: IntCounter = IntCounter::new(
        "buildboard_builds_decoded_total",
        "Builds decoded for a response",
    )
    .unwrap();

    /// Catalog lookups that found no entry, by catalog file stem.
    pub static ref CATALOG_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("buildboard_catalog_misses_total", "Catalog ids with no entry"),
        &["kind"],
    )
    .unwrap();

    /// Crit sub-stats skipped because their value was unusable.
    pub static ref MALFORMED_SUB_STATS_TOTAL: IntCounter = IntCounter::new(
        "buildboard_malformed_sub_stats_total",
        "Crit sub-stats ignored while scoring",
    )
    .unwrap();

    /// Leaderboard requests whose cursor was unknown.
    pub static ref CURSOR_FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "buildboard_cursor_fallbacks_total",
        "Stale cursors answered with the first page",
    )
    .unwrap();

    /// Catalog (re)loads, by game.
    pub static ref CATALOG_LOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("buildboard_catalog_loads_total", "Catalog loads"),
        &["game"],
    )
    .unwrap();

    /// Profile syncs accepted, by game.
    pub static ref PROFILE_SYNCS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("buildboard_profile_syncs_total", "Profile syncs written"),
        &["game"],
    )
    .unwrap();

    // ── HTTP ─────────────────────────────────────────────────────────

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("buildboard_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "buildboard_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BUILDS_DECODED_TOTAL.clone()),
            Box::new(CATALOG_MISSES_TOTAL.clone()),
            Box::new(MALFORMED_SUB_STATS_TOTAL.clone()),
            Box::new(CURSOR_FALLBACKS_TOTAL.clone()),
            Box::new(CATALOG_LOADS_TOTAL.clone()),
            Box::new(PROFILE_SYNCS_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
