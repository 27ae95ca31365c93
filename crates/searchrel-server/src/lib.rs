//! Searchrel Server - HTTP API server.
//!
//! This crate provides the HTTP API for search term relevance
//! classification.
//!
//! ## Endpoints
//!
//! - `POST /classify` - Classify a search term and return the best relevance label
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use searchrel_core::classifier::{NliClassifier, NliConfig};
//! use searchrel_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let classifier = NliClassifier::new(NliConfig::from_dir("models/mnli")).unwrap();
//!     let state = AppState::new(Arc::new(classifier));
//!     let server = Server::with_state(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8000).
    pub port: u16,
    /// Per-request classification timeout (None = wait indefinitely).
    pub classify_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            classify_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the classification timeout.
    pub fn with_classify_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.classify_timeout = timeout;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/classify", post(handlers::classify))
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with the given application state.
    ///
    /// A timeout set in `config` overrides the one in `state`.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let state = match config.classify_timeout {
            Some(timeout) => state.with_timeout(Some(timeout)),
            None => state,
        };

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = router(state).layer(cors);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Searchrel API server on {}", self.addr);

        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Allow quick restarts while old sockets sit in TIME_WAIT
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Searchrel API server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use searchrel_core::{ClassifierError, LabelScore, RelevanceLabel, ZeroShotClassifier};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Ranks labels in a fixed order and counts calls.
    struct FixedClassifier {
        ranking: Vec<LabelScore>,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                ranking: vec![
                    LabelScore::new("Pouco Relevante", 0.612_345),
                    LabelScore::new("Muito Relevante", 0.3),
                    LabelScore::new("Irrelevante ou Perigoso", 0.087_655),
                ],
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ZeroShotClassifier for FixedClassifier {
        fn classify(
            &self,
            _text: &str,
            _labels: &[&str],
            _hypothesis_template: &str,
        ) -> std::result::Result<Vec<LabelScore>, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ranking.clone())
        }
    }

    struct FailingClassifier;

    impl ZeroShotClassifier for FailingClassifier {
        fn classify(
            &self,
            _text: &str,
            _labels: &[&str],
            _hypothesis_template: &str,
        ) -> std::result::Result<Vec<LabelScore>, ClassifierError> {
            Err(ClassifierError::Inference("CUDA out of memory".to_string()))
        }
    }

    struct SlowClassifier;

    impl ZeroShotClassifier for SlowClassifier {
        fn classify(
            &self,
            _text: &str,
            labels: &[&str],
            _hypothesis_template: &str,
        ) -> std::result::Result<Vec<LabelScore>, ClassifierError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![LabelScore::new(labels[0], 1.0)])
        }
    }

    async fn post_classify(app: Router, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/classify")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_classify_returns_top_label() {
        let app = router(AppState::new(FixedClassifier::new()));

        let (status, json) = post_classify(
            app,
            json!({"input": "  gestão de stocks ", "region": "pt"}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["search_term"], "gestão de stocks");
        assert_eq!(json["region"], "pt");
        assert_eq!(json["label"], "Pouco Relevante");
        assert_eq!(json["score"], 0.6123);
        assert!(json["hypothesis_template"]
            .as_str()
            .unwrap()
            .contains("Portugal"));
    }

    #[tokio::test]
    async fn test_classify_defaults_to_pt() {
        let app = router(AppState::new(FixedClassifier::new()));

        let (status, json) =
            post_classify(app, json!({"input": "faturação"}).to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["region"], "pt");
    }

    #[tokio::test]
    async fn test_classify_each_region_uses_its_template() {
        for (region, marker) in [("pt", "Portugal"), ("es", "España"), ("latam", "América Latina")]
        {
            let app = router(AppState::new(FixedClassifier::new()));
            let (status, json) = post_classify(
                app,
                json!({"input": "mantenimiento", "region": region}).to_string(),
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["region"], region);
            assert!(json["hypothesis_template"].as_str().unwrap().contains(marker));
        }
    }

    #[tokio::test]
    async fn test_classify_label_is_candidate() {
        let app = router(AppState::new(FixedClassifier::new()));
        let (_, json) = post_classify(app, json!({"input": "stocks"}).to_string()).await;

        let label = json["label"].as_str().unwrap();
        assert!(RelevanceLabel::from_label(label).is_some());
        let score = json["score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[tokio::test]
    async fn test_whitespace_input_is_bad_request() {
        let classifier = FixedClassifier::new();
        let app = router(AppState::new(classifier.clone()));

        let (status, json) = post_classify(
            app,
            json!({"input": "   ", "region": "es"}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Input cannot be empty.");
        assert_eq!(json["code"], "empty_input");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_region_is_bad_request() {
        let classifier = FixedClassifier::new();
        let app = router(AppState::new(classifier.clone()));

        let (status, json) = post_classify(
            app,
            json!({"input": "stocks", "region": "xx"}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "unknown_region");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_input_is_bad_request() {
        let app = router(AppState::new(FixedClassifier::new()));

        let (status, json) = post_classify(app, json!({"region": "pt"}).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "bad_request");
        assert!(json["detail"].as_str().unwrap().contains("input"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = router(AppState::new(FixedClassifier::new()));

        let (status, json) = post_classify(app, "{\"input\": ".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_classifier_failure_is_server_error() {
        let app = router(AppState::new(Arc::new(FailingClassifier)));

        let (status, json) = post_classify(app, json!({"input": "stocks"}).to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "classifier_error");
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_classifier_timeout_is_server_error() {
        let state =
            AppState::new(Arc::new(SlowClassifier)).with_timeout(Some(Duration::from_millis(20)));
        let app = router(state);

        let (status, json) = post_classify(app, json!({"input": "stocks"}).to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "classifier_timeout");
    }

    #[tokio::test]
    async fn test_identical_requests_are_idempotent() {
        let state = AppState::new(FixedClassifier::new());
        let body = json!({"input": "gestão de stocks", "region": "latam"}).to_string();

        let (_, first) = post_classify(router(state.clone()), body.clone()).await;
        let (_, second) = post_classify(router(state), body).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_server_router_serves_classify() {
        let server =
            Server::with_state(ServerConfig::default(), AppState::new(FixedClassifier::new()))
                .unwrap();

        let (status, _) =
            post_classify(server.router(), json!({"input": "stocks"}).to_string()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.classify_timeout.is_none());
    }

    #[test]
    fn test_server_config_builders() {
        let config = ServerConfig::default()
            .with_host("0.0.0.0")
            .with_port(9000)
            .with_classify_timeout(Some(Duration::from_secs(5)));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.classify_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_server_rejects_invalid_address() {
        let result = Server::with_state(
            ServerConfig::default().with_host("not an address"),
            AppState::new(FixedClassifier::new()),
        );
        assert!(matches!(result, Err(ServerError::Runtime(_))));
    }
}
