//! # HTTP Server
//!
//! Binds the paste router, traces every request, and shuts down gracefully.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request},
    http::header,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, info_span, Level, Span};

use super::config::HttpServerConfig;
use super::paste_routes::{paste_routes, PasteState};
use crate::paste::PasteService;

/// HTTP server for the paste service
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around `service`
    pub fn new(config: HttpServerConfig, service: PasteService) -> Self {
        let router = Self::build_router(&config, service);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, service: PasteService) -> Router {
        let state = Arc::new(PasteState::new(service, config.clone()));

        let trace = TraceLayer::new_for_http()
            .make_span_with(request_span)
            .on_response(DefaultOnResponse::new().level(Level::INFO));

        paste_routes(state).layer(ServiceBuilder::new().layer(trace))
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        info!(addr = %listener.local_addr()?, "wpaste listening");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("wpaste stopped");
        Ok(())
    }
}

/// Span for one request: method, path, client address and user agent.
///
/// The client address is the `X-Real-IP` header set by a fronting proxy,
/// otherwise the TCP peer.
fn request_span(request: &Request) -> Span {
    let headers = request.headers();

    let addr = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.to_string())
        })
        .unwrap_or_else(|| "-".to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        addr = %addr,
        user_agent = %user_agent,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tempfile::TempDir;

    fn service() -> (TempDir, PasteService) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("data.db")).unwrap();
        (temp_dir, PasteService::new(Arc::new(store)))
    }

    #[test]
    fn test_server_with_custom_port() {
        let (_dir, service) = service();
        let server = HttpServer::new(HttpServerConfig::with_port(8080), service);
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_request_span_prefers_real_ip() {
        let request = Request::builder()
            .uri("/abc")
            .header("x-real-ip", "10.0.0.7")
            .body(axum::body::Body::empty())
            .unwrap();
        // Disabled spans carry no fields; building one must not panic.
        let _span = request_span(&request);
    }
}
