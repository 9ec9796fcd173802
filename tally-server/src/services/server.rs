//! The HTTP server and its middleware stack.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderValue, header};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::constants;
use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] io::Error),
}

/// Build the axum application with all routes and middleware.
pub fn make_app(state: ServiceState) -> Router {
    // Layers added first are called first: requests go from top to bottom, responses from bottom
    // to top.
    let middleware = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(constants::SERVER),
        ))
        .layer(middlewares::trace_http_layer());

    crate::endpoints::routes(state.config())
        .layer(middleware)
        .with_state(state)
}

/// HTTP server hosting the collector endpoints.
///
/// The server stops accepting connections when the shutdown token is cancelled and finishes
/// requests that are already in progress.
#[derive(Debug)]
pub struct HttpServer {
    listener: TcpListener,
    state: ServiceState,
}

impl HttpServer {
    /// Binds to the listen address in the config.
    pub async fn bind(state: ServiceState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(state.config().listen_addr()).await?;
        Ok(Self { listener, state })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        let Self { listener, state } = self;

        if let Ok(addr) = listener.local_addr() {
            tally_log::info!("spawning http server");
            tally_log::info!("  listening on http://{addr}/");
        }

        axum::serve(listener, make_app(state))
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tally_log::info!("shutting down http server");
            })
            .await
    }
}
