use crate::{CorpusSettings, DocumentMap, ResultViewer, SentenceBatch, ViewerError, WordBatch};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;

pub struct AppState {
    pub viewer: ResultViewer<DocumentMap>,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

pub async fn serve(config: WebConfig, viewer: ResultViewer<DocumentMap>) -> Result<(), ViewerError> {
    let corpus = viewer.settings().corpus_name.clone();
    let state = Arc::new(AppState { viewer });
    let router = build_router(state);
    info!(%config.addr, corpus = %corpus, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/corpus", get(api_corpus))
        .route("/api/sentences", post(api_sentences))
        .route("/api/words", post(api_words))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "concordance-web" }))
}

async fn api_corpus(State(state): State<SharedState>) -> Json<CorpusSettings> {
    Json(state.viewer.settings().clone())
}

// Rendering is CPU-bound (and fans out on rayon), so it runs off the async workers.
async fn api_sentences(
    State(state): State<SharedState>,
    Json(response): Json<Value>,
) -> Result<Json<SentenceBatch>, ApiError> {
    let batch = tokio::task::spawn_blocking(move || state.viewer.process_sentences(&response))
        .await
        .map_err(|err| {
            warn!(error = %err, "sentence rendering task failed");
            ApiError::internal("sentence rendering failed")
        })?;
    Ok(Json(batch))
}

async fn api_words(
    State(state): State<SharedState>,
    Json(response): Json<Value>,
) -> Result<Json<WordBatch>, ApiError> {
    let batch = tokio::task::spawn_blocking(move || state.viewer.process_words(&response))
        .await
        .map_err(|err| {
            warn!(error = %err, "word rendering task failed");
            ApiError::internal("word rendering failed")
        })?;
    Ok(Json(batch))
}
