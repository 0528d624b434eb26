//! Main sync server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::routes::create_router;
use axum::Router;
use drivesync_core::Drive;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// The sync server.
///
/// Owns the [`Drive`] for the configured storage root and exposes it over
/// HTTP. [`SyncServer::router`] builds the axum router without binding,
/// which is what tests drive; [`SyncServer::serve`] binds and runs until
/// Ctrl-C.
///
/// # Example
///
/// ```no_run
/// use drivesync_sync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> drivesync_sync_server::ServerResult<()> {
/// let config = ServerConfig::new("/srv/drive", b"signing-secret".to_vec());
/// SyncServer::new(config)?.serve().await
/// # }
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Opens the storage root and creates the server.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be opened or locked, the journal is corrupt,
    /// or the configured secrets are empty.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let drive = Drive::open(&config.storage_root, config.core.clone())?;
        Self::with_drive(config, Arc::new(drive))
    }

    /// Creates a server around an already opened drive.
    ///
    /// # Errors
    ///
    /// Fails if the configured secrets are empty.
    pub fn with_drive(config: ServerConfig, drive: Arc<Drive>) -> ServerResult<Self> {
        let context = Arc::new(HandlerContext::new(config, drive)?);
        let handler = Arc::new(RequestHandler::new(Arc::clone(&context)));
        Ok(Self { handler, context })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the served drive.
    pub fn drive(&self) -> Arc<Drive> {
        Arc::clone(&self.context.drive)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> Arc<RequestHandler> {
        Arc::clone(&self.handler)
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        create_router(self.handler(), self.config().max_chunk_bytes)
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the server stops on an I/O error.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = tokio::net::TcpListener::bind(self.config().bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            root = %self.config().storage_root.display(),
            "sync server listening"
        );

        let sweeper = spawn_sweeper(
            self.drive(),
            self.config().sweep_interval,
            self.config().core.session_max_age,
        );
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        if let Some(task) = sweeper {
            task.abort();
        }
        result?;
        info!("sync server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.context.config)
            .finish_non_exhaustive()
    }
}

/// Periodically removes upload sessions idle for longer than `max_age`.
///
/// Returns `None` when `interval` is zero.
pub fn spawn_sweeper(
    drive: Arc<Drive>,
    interval: Duration,
    max_age: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let drive = Arc::clone(&drive);
            match tokio::task::spawn_blocking(move || drive.sweep_stale_uploads(max_age)).await {
                Ok(Ok(report)) if report.sessions > 0 || report.spools_removed > 0 => {
                    info!(
                        sessions = report.sessions,
                        spools = report.spools_removed,
                        failures = report.failures,
                        "swept abandoned uploads"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "upload sweep failed"),
                Err(e) => warn!(error = %e, "upload sweep task failed"),
            }
        }
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
