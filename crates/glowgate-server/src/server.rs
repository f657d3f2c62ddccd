//! [`GatewayServer`] – binds the HTTP/SSE surface to a TCP port.
//!
//! Listens on `0.0.0.0:8888` by default (configurable via
//! [`GatewayServer::with_port`] and [`GatewayServer::with_bind_address`]).

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::{AppState, router};

/// Default TCP port for the gateway.
pub const DEFAULT_PORT: u16 = 8888;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind error on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// HTTP server for the gateway.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run(state: glowgate_server::AppState) {
/// use glowgate_server::GatewayServer;
///
/// GatewayServer::new(state)
///     .with_port(8888)
///     .run(async { let _ = tokio::signal::ctrl_c().await; })
///     .await
///     .expect("gateway server failed");
/// # }
/// ```
pub struct GatewayServer {
    state: AppState,
    bind_address: IpAddr,
    port: u16,
}

impl GatewayServer {
    /// Create a server on `0.0.0.0:`[`DEFAULT_PORT`].
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Bind and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unavailable,
    /// [`ServerError::Serve`] when the accept loop fails.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(local) = listener.local_addr() {
            info!("listening at http://localhost:{}/", local.port());
        }
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;
        info!("server stopped");
        Ok(())
    }
}
