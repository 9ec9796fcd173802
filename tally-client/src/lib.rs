//! Anonymous usage metrics for applications.
//!
//! Applications create a single [`MetricWriter`] at startup and pass it to wherever metrics are
//! recorded. Each metric is sent to the collector as a [`MetricReport`](tally_protocol::MetricReport)
//! carrying the application id and version and an install identifier persisted on the user's
//! machine.
//!
//! # Opting out
//!
//! When [`ClientConfig::no_metrics`](tally_config::ClientConfig::no_metrics) is set, the builder
//! returns [`MetricWriter::Disabled`]. A disabled writer never creates the install identifier and
//! never sends requests.
//!
//! # Shutdown
//!
//! Asynchronous writes run in the background. Before exiting, applications call
//! [`MetricWriter::close`], which waits for all pending writes and drops every write attempted
//! afterwards.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tally_client::MetricWriter;
//! use tally_config::ClientConfig;
//!
//! let config = ClientConfig::new("https://metrics.example.com".parse()?);
//! let writer = MetricWriter::builder("my-app", "1.2.0", &config).build()?;
//!
//! writer.write_metric_async("runs", 1);
//! writer.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod barrier;
mod install_id;
mod store;
mod writer;

pub use self::barrier::*;
pub use self::install_id::*;
pub use self::store::*;
pub use self::writer::*;
