//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{CvGuardError, Result};

/// An HTTP listener serving one router.
pub struct HttpServer {
    /// Label used in logs
    name: &'static str,
    /// Address to bind to
    addr: SocketAddr,
    /// Routes to serve
    router: Router,
}

impl HttpServer {
    /// Create a new server for `router`.
    pub fn new(name: &'static str, addr: SocketAddr, router: Router) -> Self {
        Self { name, addr, router }
    }

    /// The configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves. Handlers
    /// see the peer address through `ConnectInfo<SocketAddr>`.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(server = self.name, addr = %self.addr, error = %e, "Failed to bind");
            CvGuardError::Io(e)
        })?;

        info!(
            server = self.name,
            addr = %listener.local_addr()?,
            "Starting HTTP server"
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(server = self.name, error = %e, "HTTP server failed");
            CvGuardError::Io(e)
        })?;

        info!(server = self.name, "HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let server = HttpServer::new("decision", addr, Router::new());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let router = Router::new().route("/health", get(|| async { "ok" }));
        let server = HttpServer::new("decision", addr, router);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let server = HttpServer::new("decision", addr, Router::new());
        let result = server.serve_with_shutdown(async {}).await;
        assert!(matches!(result, Err(CvGuardError::Io(_))));
    }
}
