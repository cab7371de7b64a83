//! Runtime services and shared state for the relay bot.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::{
        dispatch::Dispatcher,
        relay::{RelayContext, RelayTask},
    },
    service::{backend::BackendClient, chat::ChatClient, mock_backend, pool::TaskPool},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the backend client, chat client, worker pool, and
/// configuration. It is designed to be trivially cloneable, allowing it to be
/// passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The backend client instance.
    pub backend: BackendClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The pool that runs relay tasks.
    pub pool: TaskPool<RelayTask>,
    /// Process-wide cancellation; fired on shutdown.
    pub cancel: CancellationToken,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the backend client.
        let backend = BackendClient::http(&config)?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config).await?;

        Ok(Self::with_clients(config, backend, chat))
    }

    /// Create a runtime around existing clients, starting the worker pool.
    pub fn with_clients(config: Config, backend: BackendClient, chat: ChatClient) -> Self {
        let pool = TaskPool::new(config.worker_count);

        Self {
            config,
            backend,
            chat,
            pool,
            cancel: CancellationToken::new(),
        }
    }

    /// A dispatcher feeding this runtime's pool.
    pub fn dispatcher(&self) -> Dispatcher {
        let context = RelayContext {
            config: self.config.clone(),
            backend: self.backend.clone(),
            chat: self.chat.clone(),
            cancel: self.cancel.clone(),
        };

        Dispatcher::new(self.pool.clone(), context)
    }

    /// Run until a shutdown signal, then drain the pool.
    ///
    /// Cancellation fires before the pool shuts down, so queued tasks still run
    /// but their backend calls end immediately.
    pub async fn start(&self) -> Void {
        if self.config.mock_backend {
            let port = self.config.mock_backend_port;
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                if let Err(err) = mock_backend::serve(port, cancel).await {
                    error!("Mock backend failed: {err}");
                }
            });
        }

        tokio::spawn(shutdown_signal(self.cancel.clone()));

        let result = self.chat.start(self.dispatcher(), self.cancel.clone()).await;

        if let Err(err) = &result {
            error!("Chat listener stopped: {err}");
        }

        self.shutdown().await;

        result
    }

    /// Cancel in-flight work and wait for every worker to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down ...");

        self.cancel.cancel();
        self.pool.shutdown().await;

        info!("Shutdown complete.");
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    info!("Shutdown signal received.");
    cancel.cancel();
}
