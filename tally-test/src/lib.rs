//! Helpers for testing the collector and the metric writer.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`tally_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!  - Mock servers bind to an ephemeral port on the loopback interface and stop when dropped.
//!
//! # Example
//!
//! ```no_run
//! #[tokio::test]
//! async fn my_test() {
//!     tally_test::setup();
//!
//!     let upstream = tally_test::MockUpstream::start().await;
//!     upstream.set_app("app1", ["a", "b"]);
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

mod collector;
mod upstream;

pub use self::collector::*;
pub use self::upstream::*;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the calling crate and mutes all
///    other logs.
pub fn setup() {
    tally_log::init_test!();
}

/// A router served on an ephemeral local port until dropped.
#[derive(Debug)]
struct MockServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl MockServer {
    async fn start(router: Router) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("mock server has no address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self { addr, handle }
    }

    fn url(&self) -> Url {
        format!("http://{}/", self.addr)
            .parse()
            .expect("mock server url is valid")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
