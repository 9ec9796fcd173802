//! The Tally collector.
//!
//! The collector accepts metric reports from the client library on `POST /sendMetrics`, checks
//! every metric against the allow-list of the reporting application and emits one log record per
//! accepted metric on the [`METRIC_LOG_TARGET`](constants::METRIC_LOG_TARGET) target. Aggregation
//! happens downstream on these records.
//!
//! Allow-lists are fetched from the configured upstream: a manifest lists the applications to
//! track, and each application has its own list of metric names. The
//! [`AllowListCache`](services::allow_list::AllowListCache) is refreshed periodically and keeps
//! serving the previous data if the upstream fails.
//!
//! # Running
//!
//! [`run`] sets up logging and a runtime and serves until SIGINT or SIGTERM. Embedders that
//! already own a runtime call [`serve`] with their own shutdown token.

#![warn(missing_docs)]

use std::error::Error;
use std::sync::Arc;

use anyhow::Context;
use tally_config::Config;
use tokio_util::sync::CancellationToken;

pub mod constants;
mod endpoints;
mod extractors;
mod http;
mod middlewares;
mod service;
pub mod services;
mod utils;

pub use self::service::ServiceState;
use self::services::allow_list::{AllowListCache, UpstreamSource};
use self::services::refresh::RefreshService;
use self::services::server::HttpServer;

/// Runs the collector until `shutdown` is cancelled.
///
/// The allow-lists are loaded once before the server starts accepting requests. A failure of
/// this initial load is logged and the server starts with an empty cache, rejecting all reports
/// until a later refresh succeeds.
///
/// After shutdown, in-flight requests get the configured shutdown timeout to finish.
pub async fn serve(config: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let cache = Arc::new(AllowListCache::new(config.max_concurrent_fetches()));
    let source = UpstreamSource::new(&config).context("failed to create upstream client")?;

    let refresh = RefreshService::new(
        Arc::clone(&cache),
        source,
        config.refresh_interval(),
        config.refresh_timeout(),
    );
    refresh.refresh_logged().await;
    let refresh = refresh.start(shutdown.child_token());

    let state = ServiceState::new(Arc::clone(&config), cache);
    let server = HttpServer::bind(state)
        .await
        .context("failed to start the http server")?;
    let mut server = tokio::spawn(server.serve(shutdown.clone()));

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown.cancelled() => {
            match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    tally_log::warn!("shutdown timed out, dropping open connections");
                    server.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    // The server can also stop on its own after an accept error.
    shutdown.cancel();
    if let Err(error) = refresh.await {
        tally_log::error!(error = &error as &dyn Error, "allow-list refresh panicked");
    }

    result
        .context("http server panicked")?
        .context("http server failed")
}

/// Runs the collector in a new runtime until the process receives SIGINT or SIGTERM.
pub fn run(config: Config) -> anyhow::Result<()> {
    tally_log::init(config.logging());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tally-server")
        .enable_all()
        .build()
        .context("failed to create the runtime")?;

    let config = Arc::new(config);
    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        tokio::spawn(watch_signals(shutdown.clone()));
        serve(config, shutdown).await
    })
}

async fn watch_signals(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tally_log::error!(error = &error as &dyn Error, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tally_log::error!(error = &error as &dyn Error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => (),
        _ = terminate => (),
    }

    tally_log::info!("received shutdown signal");
    shutdown.cancel();
}
