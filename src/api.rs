use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::config::{Config, ConfigError, ConfigPatch};
use crate::core::Core;
use crate::models::{LoginResult, MonitorState, PingResult};

pub fn create_router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/api/config", get(get_config).put(save_config))
        .route("/api/config/reset", post(reset_config))
        .route("/api/login", post(do_login))
        .route("/api/ping", post(test_ping))
        .route("/api/monitor", get(monitor_status))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/stop", post(stop_monitor))
        .route("/api/events", get(events))
        .with_state(core)
}

pub async fn start_server(addr: SocketAddr, core: Arc<Core>) -> anyhow::Result<()> {
    let app = create_router(core);
    info!("command api: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_config(State(core): State<Arc<Core>>) -> Json<Config> {
    Json(core.get_config())
}

async fn save_config(
    State(core): State<Arc<Core>>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<Config>, ApiError> {
    Ok(Json(core.save_config(patch)?))
}

async fn reset_config(State(core): State<Arc<Core>>) -> Result<Json<Config>, ApiError> {
    Ok(Json(core.reset_config()?))
}

async fn do_login(State(core): State<Arc<Core>>) -> Json<LoginResult> {
    Json(core.do_login().await)
}

async fn test_ping(State(core): State<Arc<Core>>) -> Json<PingResult> {
    Json(core.test_ping().await)
}

async fn monitor_status(State(core): State<Arc<Core>>) -> Json<MonitorState> {
    Json(core.monitor_status().await)
}

async fn start_monitor(State(core): State<Arc<Core>>) -> Json<serde_json::Value> {
    core.start_ping_monitor().await;
    Json(json!({ "running": core.is_monitor_running().await }))
}

async fn stop_monitor(State(core): State<Arc<Core>>) -> Json<serde_json::Value> {
    core.stop_ping_monitor().await;
    Json(json!({ "running": core.is_monitor_running().await }))
}

async fn events(
    State(core): State<Arc<Core>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(core.subscribe()).filter_map(|event| async move {
        match event {
            Ok(ev) => Event::default().json_data(&ev).ok().map(Ok),
            // a subscriber that fell behind skips to the next event
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

struct ApiError(ConfigError);

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ConfigError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
