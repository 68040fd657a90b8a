use crate::{
    app::{App, AppError, HistoryResponse, LinkResponse, SearchResponse, DEFAULT_SESSION},
    config::ServerConfig,
};
use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

pub fn router(app: Arc<App>, body_limit_bytes: usize) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/", get(root))
        .route("/search/image", post(search_image))
        .route("/search/image/base64", post(search_image_base64))
        .route("/search/link", post(search_link))
        .route("/history", get(history))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(app: App, config: ServerConfig) -> anyhow::Result<()> {
    let app = router(Arc::new(app), config.body_limit_mb * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    log::info!("listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// Serve until Ctrl+C or SIGTERM. `app` must be fully built beforehand.
pub fn start_daemon(app: App, config: ServerConfig) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?
        .block_on(start_app(app, config))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_client_error() => {
                log::debug!("{self:?}");
                axum::http::StatusCode::BAD_REQUEST
            }
            AppError::Scrape(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::BAD_GATEWAY
            }
            _ => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn session_or_default(session_id: Option<String>) -> String {
    session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "message": "DealScout backend running"}))
}

async fn run_image_query(
    state: &SharedState,
    image: Vec<u8>,
    session_id: Option<String>,
) -> Result<Json<SearchResponse>, HttpError> {
    let session_id = session_or_default(session_id);
    let app = state.app.clone();

    log::debug!("image query: bytes={} session={session_id}", image.len());

    let response = tokio::task::spawn_blocking(move || app.search_image(&image))
        .await
        .map_err(|e| AppError::Other(e.into()))??;

    // only reached when the client is still waiting for the result
    state.app.record(&session_id, &response, None);

    Ok(Json(response))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Multipart(err.body_text())
}

/// Body extraction failures answer with the same JSON error shape as handler failures.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(payload)| payload)
        .map_err(|rejection| AppError::Request(rejection.body_text()))
}

async fn search_image(
    State(state): State<Arc<SharedState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let mut multipart = multipart.map_err(|rejection| AppError::Multipart(rejection.body_text()))?;
    let mut image = None;
    let mut session_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => image = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            Some("session_id") => session_id = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::Multipart("missing field 'file'".to_string()))?;

    run_image_query(&state, image, session_id).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct Base64ImageRequest {
    /// Plain base64 or a `data:image/...;base64,` URL
    pub image: String,
    pub session_id: Option<String>,
}

fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    }
}

async fn search_image_base64(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<Base64ImageRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let payload = json_body(payload)?;
    let image = STANDARD.decode(strip_data_url(payload.image.trim()))?;

    run_image_query(&state, image, payload.session_id).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub url: String,
    pub session_id: Option<String>,
}

async fn search_link(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let payload = json_body(payload)?;
    let session_id = session_or_default(payload.session_id);
    let app = state.app.clone();
    let url = payload.url.clone();

    let outcome = tokio::task::spawn_blocking(move || app.search_link(&url))
        .await
        .map_err(|e| AppError::Other(e.into()))??;

    match outcome {
        LinkResponse::Unsupported => Ok(Json(json!({"error": "Platform not supported"})).into_response()),
        LinkResponse::Found(response) => {
            state.app.record(&session_id, &response, Some(payload.url));
            Ok(Json(response).into_response())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub session_id: Option<String>,
}

async fn history(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    Json(state.app.history(&session_or_default(query.session_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,iVBORw0"), "iVBORw0");
        assert_eq!(strip_data_url("iVBORw0"), "iVBORw0");
    }

    #[test]
    fn test_session_default() {
        assert_eq!(session_or_default(None), "anonymous");
        assert_eq!(session_or_default(Some("  ".to_string())), "anonymous");
        assert_eq!(session_or_default(Some("s1".to_string())), "s1");
    }
}
