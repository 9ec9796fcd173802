//! Wire types shared by the Tally client library and the Tally collector.
//!
//! Clients submit a [`MetricReport`] to the collector's [`SEND_METRICS_PATH`]. The collector in
//! turn reads a [`ManifestResponse`] and one [`AllowedMetricsResponse`] per application from its
//! configuration endpoint.
//!
//! With the `http` feature, [`http`] provides response helpers used by both sides.

#![warn(missing_docs)]

#[cfg(feature = "http")]
pub mod http;
mod report;
mod upstream;

pub use self::report::*;
pub use self::upstream::*;
