//! HTTP surface of the bridge.
//!
//! ### API Endpoints
//! - `GET  /eagle/get_settings`   - current settings object
//! - `POST /eagle/set_setting`    - update one setting: `{key, value}`
//! - `GET  /eagle/list_csv_files` - `.csv` files available for tag filtering
//! - `POST /send-to-eagle`        - send one image: `{filename, subfolder, folder?}`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::send::{send_to_library, SendError, SendRequest, SENT_MESSAGE};
use crate::settings::SettingsStore;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: SettingsStore,
    pub csv_dir: PathBuf,
}

impl AppState {
    pub fn new(settings: SettingsStore, csv_dir: impl Into<PathBuf>) -> Self {
        AppState {
            settings,
            csv_dir: csv_dir.into(),
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}

/// Builds the routing table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/eagle/get_settings", get(get_settings))
        .route("/eagle/set_setting", post(set_setting))
        .route("/eagle/list_csv_files", get(list_csv_files))
        .route("/send-to-eagle", post(send_to_eagle))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serves `router` on `addr` until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening for send requests");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = ?e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(Value::Object(state.settings.load().into_map()))
}

#[derive(Debug, Deserialize)]
struct SetSettingBody {
    key: Option<String>,
    #[serde(default)]
    value: Value,
}

async fn set_setting(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let key = serde_json::from_slice::<SetSettingBody>(&body)
        .ok()
        .and_then(|b| b.key.map(|k| (k, b.value)));
    let Some((key, value)) = key else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "Setting 'key' not provided"})),
        )
            .into_response();
    };

    match state.settings.set(&key, value) {
        Ok(()) => {
            info!(key = %key, "Updated setting");
            Json(json!({"status": "ok"})).into_response()
        }
        Err(e) => {
            error!(error = ?e, key = %key, "Failed to save settings");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn list_csv_files(State(state): State<Arc<AppState>>) -> Response {
    if !state.csv_dir.exists() {
        return Json(Vec::<String>::new()).into_response();
    }
    match csv_file_names(&state.csv_dir) {
        Ok(names) => Json(names).into_response(),
        Err(e) => {
            error!(error = ?e, dir = %state.csv_dir.display(), "Error listing CSV files");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::<String>::new())).into_response()
        }
    }
}

fn csv_file_names(dir: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(".csv") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn send_to_eagle(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: SendRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return SendError::InvalidRequest(format!("malformed body: {e}")).into_response();
        }
    };
    match send_to_library(&request, &state.settings, &state.csv_dir).await {
        Ok(report) => {
            info!(path = %report.path.display(), "Send completed");
            (StatusCode::OK, SENT_MESSAGE).into_response()
        }
        Err(e) => e.into_response(),
    }
}
