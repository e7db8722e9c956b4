//! Filedrop server binary.
//!
//! Resolves the storage root for the host platform, makes sure it exists,
//! seeds the in-memory file registry and serves the upload, download and
//! listing routes until a shutdown signal arrives.

mod atomic;
mod background;
mod config;
mod error;
mod files;
mod http;
mod locking;
mod logging;
mod registry;
mod storage;
mod transfer;
mod view;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::background::spawn_temp_sweeper;
use crate::config::{Args, DEFAULT_LOCK_WAIT_TIMEOUT_SECS, Platform, resolve_root};
use crate::registry::FileRegistry;
use crate::storage::Storage;
use crate::transfer::FileService;

shadow!(build);

/// Starts the Filedrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let platform = Platform::current();
    let root = resolve_root(platform, &args.root_paths())?;
    info!(%platform, root = ?root, "resolved storage root");

    let storage = Arc::new(Storage::new(root));
    storage.ensure_root().await?;

    let samples = args.sample_names();
    info!(count = samples.len(), "seeding file registry");
    let service = Arc::new(FileService::new(
        storage.clone(),
        FileRegistry::with_samples(samples),
        Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
    ));
    let app = http::build_router(service, args.upload_max_size);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_temp_sweeper(storage, Duration::from_secs(args.temp_ttl_secs));
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
