//! Middlewares for the HTTP server.
//!
//! See [`make_app`](crate::services::server::make_app) for where these middlewares are
//! registered.

mod handle_panic;
mod trace;

pub use self::handle_panic::*;
pub use self::trace::*;
