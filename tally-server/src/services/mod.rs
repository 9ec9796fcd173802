//! Long-running parts of the collector.

pub mod allow_list;
pub mod refresh;
pub mod server;
