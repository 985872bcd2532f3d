//! Server assembly and shutdown orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::admin::setup_admin_router;
use crate::auth::{Authenticator, FileTokenStore, RegistryError, RegistryWatcher};
use crate::cache::MetricCache;
use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::{tls, ConnectionPermit, Listener, ListenerError, TlsError};
use crate::server::handler::{ConnectionError, ConnectionHandler};
use crate::server::state::{ConnectionLimits, ServerState};
use crate::storage::{LogWriter, LogWriterError, LogWriterHandle};

/// Fatal startup and runtime failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    LogWriter(#[from] LogWriterError),

    #[error("failed to watch token registry: {0}")]
    Watch(#[from] notify::Error),

    #[error("admin API failed: {0}")]
    Admin(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The ingestion server, before it is started.
pub struct IngestServer {
    config: ServerConfig,
    clock: Arc<dyn Clock>,
}

impl IngestServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the system clock (tests, simulations).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start and run until `shutdown` fires and every subsystem has stopped.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServerError> {
        self.start(shutdown).await?.wait().await
    }

    /// Build every subsystem and bind the sockets, then serve in the background.
    ///
    /// Any error here is fatal: nothing is left running.
    pub async fn start(self, shutdown: Shutdown) -> Result<RunningServer, ServerError> {
        let config = self.config;

        let store = Arc::new(FileTokenStore::open(&config.auth.registry_path)?);
        let watcher = if config.auth.watch {
            Some(RegistryWatcher::new(Arc::clone(&store)).run()?)
        } else {
            None
        };

        let acceptor = match &config.listener.tls {
            Some(tls_config) => Some(tls::load_acceptor(&tls_config.cert_path, &tls_config.key_path)?),
            None => {
                tracing::warn!("TLS disabled, accepting plaintext connections");
                None
            }
        };

        let listener = Listener::bind(&config.listener).await?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        let admin_listener = if config.admin.enabled {
            Some(
                tokio::net::TcpListener::bind(&config.admin.bind_address)
                    .await
                    .map_err(ServerError::Admin)?,
            )
        } else {
            None
        };

        // Sockets are bound; from here on only infallible setup remains apart
        // from the log directory.
        let cache = Arc::new(MetricCache::new(config.cache.ttl_secs, Arc::clone(&self.clock)));
        let (log, log_handle) = LogWriter::spawn(&config.log_writer, Arc::clone(&self.clock))?;
        let state = Arc::new(ServerState::new(
            Authenticator::new(store, Arc::clone(&self.clock)),
            cache,
            log,
            ConnectionLimits::from(&config.connection),
        ));

        let admin = match admin_listener {
            Some(admin_listener) => {
                let admin_addr = admin_listener.local_addr().map_err(ServerError::Admin)?;
                let app = setup_admin_router(Arc::clone(&state), &config.admin.api_key);
                let mut admin_shutdown = shutdown.subscribe();
                let task = tokio::spawn(async move {
                    tracing::info!(address = %admin_addr, "Admin API listening");
                    axum::serve(admin_listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = admin_shutdown.recv().await;
                        })
                        .await
                });
                Some((admin_addr, task))
            }
            None => None,
        };

        let accept_loop = AcceptLoop {
            listener,
            acceptor,
            state: Arc::clone(&state),
            shutdown_rx: shutdown.subscribe(),
            shutdown,
            grace_period: Duration::from_secs(config.shutdown.grace_period_secs),
        };
        let admin_addr = admin.as_ref().map(|(addr, _)| *addr);
        let task = tokio::spawn(accept_loop.run(log_handle, admin.map(|(_, task)| task), watcher));

        Ok(RunningServer {
            local_addr,
            admin_addr,
            state,
            task,
        })
    }
}

/// A started server.
pub struct RunningServer {
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    state: Arc<ServerState>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Address of the protocol listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the admin API, when enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Wait for the shutdown sequence to finish.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.task.await?
    }
}

struct AcceptLoop {
    listener: Listener,
    acceptor: Option<TlsAcceptor>,
    state: Arc<ServerState>,
    shutdown: Shutdown,
    shutdown_rx: broadcast::Receiver<()>,
    grace_period: Duration,
}

impl AcceptLoop {
    async fn run(
        mut self,
        log_handle: LogWriterHandle,
        admin: Option<JoinHandle<std::io::Result<()>>>,
        watcher: Option<RecommendedWatcher>,
    ) -> Result<(), ServerError> {
        let mut connections = JoinSet::new();

        tracing::info!(
            address = %self.listener.local_addr().map_err(ListenerError::Bind)?,
            tls = self.acceptor.is_some(),
            "Accepting metric connections"
        );

        while !self.shutdown.is_triggered() {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let conn = self.connection(stream, peer, permit);
                        connections.spawn(conn);
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Listener stopped");
                        break;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        // 1. Stop accepting.
        self.listener.close();
        tracing::info!(active = connections.len(), "Shutting down, waiting for connections");

        // 2. Let handlers finish the line they are on.
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(self.grace_period, drain).await.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                grace_secs = self.grace_period.as_secs(),
                "Grace period elapsed, aborting connections"
            );
            connections.shutdown().await;
        }

        // 3 and 4. Drain the log queue, then stop its consumer.
        log_handle.shutdown().await;

        drop(watcher);
        if let Some(admin) = admin {
            match admin.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
                Err(e) => tracing::error!(error = %e, "Admin API task failed"),
            }
        }

        // 5. Close the listening socket.
        drop(self.listener);
        tracing::info!("Server stopped");
        Ok(())
    }

    fn connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let acceptor = self.acceptor.clone();
        let state = Arc::clone(&self.state);
        let shutdown_rx = self.shutdown.subscribe();
        let guard = state.tracker.track();
        let span = tracing::info_span!("connection", connection_id = %guard.id(), peer = %peer);

        async move {
            let _permit = permit;
            let _guard = guard;
            let handshake_timeout = state.limits.handshake_timeout;
            let handler = ConnectionHandler::new(state);

            let _ = stream.set_nodelay(true);
            let result = match acceptor {
                Some(acceptor) => match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                    Ok(Ok(tls_stream)) => handler.run(tls_stream, shutdown_rx).await,
                    Ok(Err(e)) => Err(ConnectionError::Handshake(e)),
                    Err(_) => Err(ConnectionError::HandshakeTimeout),
                },
                None => handler.run(stream, shutdown_rx).await,
            };

            match result {
                Ok(()) => tracing::debug!("Connection closed"),
                Err(e) if e.is_disconnect() => tracing::debug!(error = %e, "Peer disconnected"),
                Err(e) => tracing::info!(error = %e, "Connection closed with error"),
            }
        }
        .instrument(span)
    }
}
