//! Listener startup and bounded graceful shutdown.

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("listen: {0}")]
    Serve(#[from] std::io::Error),
    #[error("Server forced to shutdown: drain exceeded {0:?}")]
    ForcedShutdown(Duration),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Lifecycle {
    phase: watch::Sender<ServerPhase>,
    drain_timeout: Duration,
}

impl Lifecycle {
    pub fn new(drain_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(ServerPhase::Starting);
        Self {
            phase,
            drain_timeout,
        }
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    fn transition(&self, next: ServerPhase) {
        info!(from = ?self.phase(), to = ?next, "server phase change");
        self.phase.send_replace(next);
    }

    pub async fn bind(&self, addr: SocketAddr) -> Result<TcpListener, LifecycleError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| LifecycleError::Bind { addr, source })
    }

    /// Serves `app` on its own task until `signal` resolves, then drains.
    ///
    /// In-flight requests get `drain_timeout` to finish once the signal fires;
    /// past that the server task is aborted and [`LifecycleError::ForcedShutdown`]
    /// is returned.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        app: Router,
        signal: F,
    ) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()> + Send,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }

        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        self.transition(ServerPhase::Listening);

        tokio::select! {
            _ = signal => {}
            joined = &mut server => {
                // The listener died before any shutdown was requested.
                self.transition(ServerPhase::Stopped);
                joined??;
                return Ok(());
            }
        }

        self.transition(ServerPhase::ShuttingDown);
        info!("Shutting down server...");
        let _ = stop_tx.send(());

        match tokio::time::timeout(self.drain_timeout, &mut server).await {
            Ok(joined) => {
                self.transition(ServerPhase::Stopped);
                joined??;
                info!("Server exiting");
                Ok(())
            }
            Err(_) => {
                server.abort();
                self.transition(ServerPhase::Stopped);
                error!(timeout = ?self.drain_timeout, "Server forced to shutdown");
                Err(LifecycleError::ForcedShutdown(self.drain_timeout))
            }
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
