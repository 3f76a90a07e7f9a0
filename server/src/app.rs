//! Application lifecycle management and graceful shutdown.
//!
//! 1. **Startup**: connect to `PostgreSQL`, run migrations, install the
//!    metrics recorder, start the penalty scheduler, bind the listener
//! 2. **Runtime**: serve HTTP while the scheduler accrues penalties
//! 3. **Shutdown**: on Ctrl+C or SIGTERM stop accepting connections, then
//!    stop the scheduler after its in-flight tick
//!
//! ```rust,ignore
//! let app = Application::build(Config::from_env()).await?;
//! app.run().await?;
//! ```

use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;
use libris_core::{BorrowLifecycle, LibraryError, SystemClock};
use libris_postgres::PostgresLibraryStore;
use libris_runtime::metrics::{MetricsError, MetricsServer};
use libris_runtime::{PenaltyScheduler, SchedulerHandle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Failures that stop the process.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Database unreachable or migrations failed
    #[error("database setup failed: {0}")]
    Database(#[from] LibraryError),
    /// Listener could not be bound, or the server loop failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Prometheus recorder could not be installed
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Running application.
///
/// Owns the listener, the router and the penalty scheduler.
pub struct Application {
    /// TCP listener for HTTP server
    listener: tokio::net::TcpListener,

    /// Axum router with all HTTP routes
    app: axum::Router,

    /// Background penalty accrual
    scheduler: SchedulerHandle,
}

impl Application {
    /// Wire every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable, migrations fail, the
    /// metrics recorder cannot be installed or the address cannot be bound.
    pub async fn build(config: Config) -> Result<Self, ApplicationError> {
        let store =
            PostgresLibraryStore::connect(&config.postgres.url, &config.postgres.pool_settings())
                .await?;
        store.migrate().await?;
        info!("Database migrations applied");

        let lifecycle = BorrowLifecycle::new(Arc::new(store), Arc::new(SystemClock))
            .with_borrow_policy(config.lending.borrow_policy())
            .with_penalty_policy(config.lending.penalty_policy());

        let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
        let local_addr = listener.local_addr()?;

        let mut metrics = MetricsServer::new(local_addr);
        metrics.start()?;

        let scheduler = PenaltyScheduler::new(lifecycle.clone())
            .with_period(config.lending.accrual_interval())
            .with_shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout))
            .start();

        let state = AppState::new(lifecycle, config.lending, metrics.handle().cloned());

        Ok(Self {
            listener,
            app: build_router(state),
            scheduler,
        })
    }

    /// Serve until a shutdown signal arrives, then stop the scheduler.
    ///
    /// # Errors
    ///
    /// Returns error if the server loop fails.
    pub async fn run(self) -> Result<(), ApplicationError> {
        info!(address = ?self.listener.local_addr().ok(), "HTTP server listening for requests");

        let served = axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        info!("HTTP server stopped, stopping penalty scheduler");
        self.scheduler.stop().await;

        served?;
        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
