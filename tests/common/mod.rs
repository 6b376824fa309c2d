#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

/// Behaviour knobs and request log for the fake library.
pub struct FakeLibrary {
    pub folders: Value,
    pub fail_list: bool,
    pub fail_create: bool,
    pub fail_add: bool,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub created_names: Mutex<Vec<String>>,
    pub items: Mutex<Vec<Value>>,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub content_types: Mutex<Vec<Option<String>>>,
}

impl Default for FakeLibrary {
    fn default() -> Self {
        FakeLibrary {
            folders: json!([]),
            fail_list: false,
            fail_create: false,
            fail_add: false,
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            created_names: Mutex::new(Vec::new()),
            items: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
            content_types: Mutex::new(Vec::new()),
        }
    }
}

impl FakeLibrary {
    pub fn with_folders(folders: Value) -> Self {
        FakeLibrary {
            folders,
            ..FakeLibrary::default()
        }
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn last_item(&self) -> Option<Value> {
        self.items.lock().unwrap().last().cloned()
    }

    fn record_headers(&self, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        self.auth_headers.lock().unwrap().push(header("authorization"));
        self.content_types.lock().unwrap().push(header("content-type"));
    }
}

async fn folder_list(State(fake): State<Arc<FakeLibrary>>, headers: HeaderMap) -> Response {
    fake.list_calls.fetch_add(1, Ordering::SeqCst);
    fake.record_headers(&headers);
    if fake.fail_list {
        return (StatusCode::INTERNAL_SERVER_ERROR, "list exploded").into_response();
    }
    Json(json!({"status": "success", "data": fake.folders})).into_response()
}

async fn folder_create(
    State(fake): State<Arc<FakeLibrary>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let n = fake.create_calls.fetch_add(1, Ordering::SeqCst);
    fake.record_headers(&headers);
    if fake.fail_create {
        return (StatusCode::BAD_REQUEST, "create refused").into_response();
    }
    let name = body["folderName"].as_str().unwrap_or_default().to_string();
    fake.created_names.lock().unwrap().push(name.clone());
    Json(json!({"status": "success", "data": {"id": format!("NEW{n}"), "name": name}}))
        .into_response()
}

async fn item_add(
    State(fake): State<Arc<FakeLibrary>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.add_calls.fetch_add(1, Ordering::SeqCst);
    fake.record_headers(&headers);
    fake.items.lock().unwrap().push(body);
    if fake.fail_add {
        return (StatusCode::SERVICE_UNAVAILABLE, "library busy").into_response();
    }
    Json(json!({"status": "success"})).into_response()
}

/// Starts the fake on an ephemeral port and returns its base URL.
pub async fn spawn_fake_library(fake: FakeLibrary) -> (String, Arc<FakeLibrary>) {
    let fake = Arc::new(fake);
    let app = Router::new()
        .route("/api/folder/list", get(folder_list))
        .route("/api/folder/create", post(folder_create))
        .route("/api/item/addFromPath", post(item_add))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), fake)
}

/// Writes a 1x1 PNG carrying the given text chunks.
pub fn write_png(path: &std::path::Path, chunks: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), 1, 1);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    for (keyword, text) in chunks {
        encoder
            .add_text_chunk(keyword.to_string(), text.to_string())
            .unwrap();
    }
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(&[0]).unwrap();
}
