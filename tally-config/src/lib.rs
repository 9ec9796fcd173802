//! Configuration for the Tally collector and the Tally client library.
//!
//! The collector reads its [`Config`] from a `config.yml` file within a configuration folder. The
//! client library is configured with a [`ClientConfig`], which the embedding application either
//! constructs directly or deserializes from its own configuration.
//!
//! All sections and fields are optional unless noted otherwise and fall back to defaults.

#![warn(missing_docs)]

mod client;
mod config;

pub use self::client::*;
pub use self::config::*;
