//! Constants shared across the collector.

/// Value of the `Server` header on all responses.
pub const SERVER: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

/// Log target of the records emitted for every accepted metric.
///
/// Downstream aggregation selects records by this target.
pub const METRIC_LOG_TARGET: &str = "tally::metric";

/// Maximum number of response body bytes kept when an upstream request fails.
pub const MAX_ERROR_BODY_BYTES: usize = 2048;
