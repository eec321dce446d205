use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Query, Request, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderName, TRANSFER_ENCODING};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shelter_engine::{
    ClientMessage, Destination, Effect, EngineConfig, Event, Fetcher, ProxyRequest, ProxyResponse,
    Registration, ShelterError, WorkerState,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;

/// Prefix of the control routes, never proxied
pub const CONTROL_PREFIX: &str = "/__shelter";

const SOURCE_HEADER: HeaderName = HeaderName::from_static("x-shelter-source");

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    pub engine_config: Arc<EngineConfig>,
    /// Used for requests the engine does not handle
    pub passthrough: Arc<dyn Fetcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{CONTROL_PREFIX}/message"), post(message))
        .route(&format!("{CONTROL_PREFIX}/sync"), post(sync))
        .route(&format!("{CONTROL_PREFIX}/push"), post(push))
        .route(
            &format!("{CONTROL_PREFIX}/notification-click"),
            post(notification_click),
        )
        .route(&format!("{CONTROL_PREFIX}/status"), get(status))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, config: &ServerConfig, listen: &str) -> Result<(), AppError> {
    if let Some(interval) = config.sync_interval() {
        let registration = state.registration.clone();
        let tag = state.engine_config.sync_tag.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = registration.dispatch(Event::Sync { tag: tag.clone() }).await {
                    warn!(error = %e, "Periodic sync failed");
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "Periodic background sync enabled");
    }

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, origin = %state.engine_config.origin, "Proxy listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

struct ApiError(ShelterError);

impl From<ShelterError> for ApiError {
    fn from(error: ShelterError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ShelterError::Install(_) | ShelterError::StatusCode { .. } | ShelterError::HttpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            ShelterError::UrlError(_) | ShelterError::Config(_) | ShelterError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            ShelterError::Lifecycle(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Describe a non-response effect as JSON
pub fn describe(effect: &Effect) -> Value {
    match effect {
        Effect::Installed(report) => json!({ "installed": report }),
        Effect::Activated(report) => json!({ "activated": report }),
        Effect::Respond(response) => json!({ "respond": response.status.as_u16() }),
        Effect::Passthrough(request) => json!({ "passthrough": request.url.as_str() }),
        Effect::NoResponse(reason) => json!({ "no_response": reason }),
        Effect::Synced(report) => json!({ "synced": report }),
        Effect::SyncIgnored => json!({ "sync_ignored": true }),
        Effect::ShowNotification(notification) => json!({ "show_notification": notification }),
        Effect::OpenWindow(url) => json!({ "open_window": url.as_str(), "close_notification": true }),
        Effect::CloseNotification => json!({ "close_notification": true }),
        Effect::SkipWaiting => json!({ "skip_waiting": true }),
        Effect::CachedUrls(count) => json!({ "cached_urls": count }),
        Effect::Ignored => json!({ "ignored": true }),
    }
}

/// Convert an engine response into an HTTP response for the page
pub fn to_http(response: ProxyResponse) -> Response {
    let source = match response.source {
        shelter_engine::ResponseSource::Network => "network",
        shelter_engine::ResponseSource::Cache => "cache",
        shelter_engine::ResponseSource::Fallback => "fallback",
    };

    let mut headers = response.headers;
    // Bodies are already decoded and buffered
    for name in [CONTENT_LENGTH, CONTENT_ENCODING, TRANSFER_ENCODING] {
        headers.remove(name);
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = response.status;
    *http.headers_mut() = headers;
    http
}

async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.engine_config.resolve(path).map_err(ShelterError::from)?;
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ShelterError::ProxyError(format!("failed to read request body: {e}")))?;

    let mut proxied = ProxyRequest::new(parts.method, url)
        .with_destination(Destination::from_headers(&parts.headers))
        .with_headers(parts.headers);
    if !body.is_empty() {
        proxied = proxied.with_body(body);
    }

    match state.registration.dispatch(Event::Fetch(proxied)).await? {
        Effect::Respond(response) => Ok(to_http(response)),
        Effect::Passthrough(request) => Ok(to_http(state.passthrough.fetch(&request).await?)),
        Effect::NoResponse(reason) => {
            warn!(reason = %reason, "No response available");
            Ok((StatusCode::BAD_GATEWAY, reason).into_response())
        }
        other => Ok(Json(describe(&other)).into_response()),
    }
}

async fn message(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let message = ClientMessage::parse(&body);
    let effect = state.registration.dispatch(Event::Message(message)).await?;
    Ok(Json(describe(&effect)))
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    tag: Option<String>,
}

async fn sync(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<Value>, ApiError> {
    let tag = query
        .tag
        .unwrap_or_else(|| state.engine_config.sync_tag.clone());
    let effect = state.registration.dispatch(Event::Sync { tag }).await?;
    Ok(Json(describe(&effect)))
}

async fn push(State(state): State<AppState>, body: String) -> Result<Json<Value>, ApiError> {
    let payload = (!body.is_empty()).then_some(body);
    let effect = state.registration.dispatch(Event::Push { payload }).await?;
    Ok(Json(describe(&effect)))
}

#[derive(Debug, Deserialize)]
struct ClickBody {
    #[serde(default)]
    action: String,
    url: Option<String>,
}

async fn notification_click(
    State(state): State<AppState>,
    Json(click): Json<ClickBody>,
) -> Result<Json<Value>, ApiError> {
    let effect = state
        .registration
        .dispatch(Event::NotificationClick {
            action: click.action,
            url: click.url,
        })
        .await?;
    Ok(Json(describe(&effect)))
}

#[derive(Debug, Serialize)]
struct VersionStatus {
    version: String,
    state: WorkerState,
}

#[derive(Debug, Serialize)]
struct Status {
    active: Option<VersionStatus>,
    waiting: Option<VersionStatus>,
    partitions: Vec<String>,
}

async fn status(State(state): State<AppState>) -> Result<Json<Status>, ApiError> {
    let version_status = |engine: &shelter_engine::Engine| VersionStatus {
        version: engine.version().to_owned(),
        state: engine.state(),
    };
    let active = state.registration.active();
    let partitions = match &active {
        Some(engine) => engine
            .cache()
            .store()
            .partitions()
            .await
            .map_err(ShelterError::from)?,
        None => Vec::new(),
    };

    Ok(Json(Status {
        active: active.as_deref().map(version_status),
        waiting: state.registration.waiting().as_deref().map(version_status),
        partitions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use shelter_engine::ResponseSource;

    #[test]
    fn test_to_http_marks_source_and_strips_framing() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert("content-type", HeaderValue::from_static("text/css"));

        let response = to_http(ProxyResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"body{}"),
            ResponseSource::Cache,
        ));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-shelter-source").unwrap(), "cache");
        assert_eq!(response.headers().get("content-type").unwrap(), "text/css");
        assert!(response.headers().get(CONTENT_ENCODING).is_none());
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_describe_effects() {
        assert_eq!(describe(&Effect::SkipWaiting), json!({ "skip_waiting": true }));
        assert_eq!(describe(&Effect::CachedUrls(2)), json!({ "cached_urls": 2 }));
        assert_eq!(
            describe(&Effect::OpenWindow(url::Url::parse("https://white.plus/").unwrap())),
            json!({ "open_window": "https://white.plus/", "close_notification": true })
        );
    }
}
