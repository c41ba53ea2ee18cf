//! HTTP transport: query endpoint with SSE streaming, and a health endpoint
//! for readiness checks.

pub mod stream;

pub use stream::Frame;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Db;
use crate::embeddings::OllamaEmbedder;
use crate::error::{Result, ScholaragError};
use crate::generation::Generator;

/// Shared per-process state, dependency-injected into every session.
///
/// All members are read-only on the query path; concurrent sessions share
/// them through `Arc`s with no cross-session mutable state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub embedder: Arc<OllamaEmbedder>,
    pub generator: Arc<Generator>,
    pub config: Arc<Config>,
}

/// Query request body
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// The HTTP server owning the request-handling context.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(db: Db, embedder: OllamaEmbedder, generator: Generator, config: Config) -> Self {
        Self {
            state: AppState {
                db: Arc::new(db),
                embedder: Arc::new(embedder),
                generator: Arc::new(generator),
                config: Arc::new(config),
            },
        }
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(&self) -> Result<()> {
        let app = self.create_router();
        let addr = format!("127.0.0.1:{}", self.state.config.http_server.port);
        log::info!("Starting Scholarag HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ScholaragError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        axum::serve(listener, app).await.map_err(|e| {
            ScholaragError::Io(std::io::Error::other(format!("HTTP server error: {}", e)))
        })?;

        Ok(())
    }

    fn create_router(&self) -> Router {
        let allowed_origins = &self.state.config.http_server.allowed_origins;

        // Empty allowlist means any origin (local development); otherwise
        // restrict to the configured origins.
        let cors = if allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/query", post(handle_query))
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
            .with_state(self.state.clone())
    }
}

/// Handle a query: spawn the session pipeline and stream its frames.
///
/// When the client disconnects the SSE stream (and with it the channel
/// receiver) is dropped, which cancels the session at its next send.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Frame>(32);
    tokio::spawn(stream::run_session(state, request.query, tx));

    let frames = ReceiverStream::new(rx).map(|frame| Ok(frame.to_event()));

    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Readiness check: reports store connectivity.
async fn handle_health(State(state): State<AppState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "service": "scholarag",
                "version": env!("CARGO_PKG_VERSION")
            })),
        )
            .into_response(),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable"
                })),
            )
                .into_response()
        }
    }
}
