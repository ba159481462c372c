//! Connection acceptance for the edge ports.
//!
//! Each [`EdgeListener`] owns one TCP socket and one router. Connections are
//! served on their own task through hyper-util's auto (HTTP/1 + HTTP/2)
//! builder. Concurrency is capped by a semaphore shared by every listener of
//! the process: when all permits are taken the accept loop stops accepting
//! until a connection closes.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, extract::ConnectInfo};
use hyper::{Request, body::Incoming};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::tls::TlsError;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Traffic class of a listener. Inserted into every request's extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Plain HTTP, cache path.
    Http,
    /// TLS-terminated HTTPS, cache path.
    Https,
    /// Load-balancer port, router path.
    Balancer,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Balancer => "balancer",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("listener I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Connection-level limits shared by the listeners of a process.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    permits: Arc<Semaphore>,
    max_connections: usize,
    /// Maximum time an idle connection may take to send the next request head.
    pub keep_alive: Duration,
    /// How long shutdown waits for open connections.
    pub shutdown_grace: Duration,
}

impl ConnectionLimits {
    pub fn new(max_connections: usize, keep_alive: Duration, shutdown_grace: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            keep_alive,
            shutdown_grace,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of connections currently open across all listeners.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.permits.available_permits()
    }
}

/// A bound edge port.
pub struct EdgeListener {
    kind: ListenerKind,
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    app: Router,
    limits: ConnectionLimits,
}

impl EdgeListener {
    /// Binds `addr`. Port `0` picks a free port.
    pub async fn bind(
        kind: ListenerKind,
        addr: SocketAddr,
        app: Router,
        limits: ConnectionLimits,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            kind,
            listener,
            tls: None,
            app,
            limits,
        })
    }

    /// Terminates TLS on every accepted connection.
    pub fn with_tls(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(TlsAcceptor::from(config));
        self
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` flips to `true`, then drains.
    ///
    /// Open connections are asked to finish their in-flight request and are
    /// aborted once the shutdown grace period elapses.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ListenerError> {
        let addr = self.listener.local_addr()?;
        info!(
            listener = %self.kind,
            addr = %addr,
            tls = self.tls.is_some(),
            "Listener accepting connections"
        );

        let mut connections = JoinSet::new();

        loop {
            if self.limits.permits.available_permits() == 0 {
                warn!(
                    listener = %self.kind,
                    max_connections = self.limits.max_connections(),
                    "Connection limit reached, pausing accept"
                );
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.limits.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(listener = %self.kind, error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    },
                },
                _ = shutdown_requested(&mut shutdown) => break,
            };

            debug!(
                listener = %self.kind,
                peer = %peer,
                active = self.limits.active_connections(),
                "Connection accepted"
            );

            let connection = Connection {
                kind: self.kind,
                peer,
                app: self.app.clone(),
                keep_alive: self.limits.keep_alive,
                shutdown: shutdown.clone(),
                _permit: permit,
            };
            connections.spawn(connection.run(stream, self.tls.clone()));

            // Liberar handles de conexiones terminadas
            while connections.try_join_next().is_some() {}
        }

        info!(
            listener = %self.kind,
            open = connections.len(),
            active = self.limits.active_connections(),
            "Listener stopped accepting, draining connections"
        );

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(self.limits.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!(
                listener = %self.kind,
                remaining = connections.len(),
                "Shutdown grace elapsed, aborting connections"
            );
            connections.abort_all();
        }

        Ok(())
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // Un sender cerrado tambien cuenta como shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// One accepted connection. Holds its slot until it closes.
struct Connection {
    kind: ListenerKind,
    peer: SocketAddr,
    app: Router,
    keep_alive: Duration,
    shutdown: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    async fn run(self, stream: TcpStream, tls: Option<TlsAcceptor>) {
        let Some(acceptor) = tls else {
            return self.drive(TokioIo::new(stream)).await;
        };

        match tokio::time::timeout(self.keep_alive, acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => self.drive(TokioIo::new(tls_stream)).await,
            Ok(Err(e)) => debug!(peer = %self.peer, error = %e, "TLS handshake failed"),
            Err(_) => debug!(peer = %self.peer, "TLS handshake timed out"),
        }
    }

    async fn drive<I>(mut self, io: TokioIo<I>)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = self.peer;
        let kind = self.kind;
        let app = self.app.clone();

        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer));
            request.extensions_mut().insert(kind);
            app.clone().oneshot(request)
        });

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .keep_alive(true)
            .timer(TokioTimer::new())
            .header_read_timeout(self.keep_alive);
        builder.http2().timer(TokioTimer::new());

        let connection = builder.serve_connection_with_upgrades(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "Connection closed with error");
                }
            }
            _ = shutdown_requested(&mut self.shutdown) => {
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.as_mut().await {
                    debug!(peer = %peer, error = %e, "Connection closed with error during shutdown");
                }
            }
        }
    }
}
