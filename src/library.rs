//! # library: client for the Eagle asset library REST API
//!
//! This module defines the [`Library`] trait the send pipeline depends on, the
//! payload types exchanged with the service, and [`LibraryClient`], the reqwest
//! implementation.
//!
//! ## Wire contract
//! - `GET  {base}/api/folder/list`      → `{ "data": [ { id, name, children: [...] } ] }`
//! - `POST {base}/api/folder/create`    → `{ "data": { id, ... } }`
//! - `POST {base}/api/item/addFromPath` → `{ ... }`
//!
//! Every request carries `Content-Type: application/json`, plus
//! `Authorization: Bearer <token>` when a token is configured.
//!
//! ## Folder resolution
//! The folder tree is fetched once per client and cached as a flat list. Folder
//! lookups never fail the caller: they resolve to a [`FolderResolution`] which the
//! caller inspects, and an unresolved folder simply means the item is added
//! without one. Item submission errors are returned as-is.
//!
//! ## Mocking & Testing
//! The trait is annotated for `mockall` so the orchestrator can be tested without
//! a running library.

use async_trait::async_trait;
use mockall::automock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::settings::Settings;

const FOLDER_LIST: &str = "/api/folder/list";
const FOLDER_CREATE: &str = "/api/folder/create";
const ITEM_ADD_FROM_PATH: &str = "/api/item/addFromPath";

/// A folder known to the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
}

impl FolderInfo {
    pub fn matches(&self, name_or_id: &str) -> bool {
        self.name == name_or_id || self.id == name_or_id
    }
}

/// Payload for `addFromPath`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSubmission {
    pub path: String,
    pub name: String,
    pub annotation: String,
    pub tags: Vec<String>,
    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("request to library failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("library returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected library response: {0}")]
    Decode(String),
    #[error("library did not return a folder id")]
    MissingFolderId,
    #[error("folder name is empty")]
    EmptyFolderName,
}

/// Outcome of [`Library::find_or_create_folder`].
#[derive(Debug)]
pub enum FolderResolution {
    /// The folder was already in the library.
    Existing(String),
    /// The folder was created by this call.
    Created(String),
    /// No folder could be found or created; items go to the library root.
    Unresolved(LibraryError),
}

impl FolderResolution {
    pub fn folder_id(&self) -> Option<&str> {
        match self {
            FolderResolution::Existing(id) | FolderResolution::Created(id) => Some(id),
            FolderResolution::Unresolved(_) => None,
        }
    }

    pub fn into_folder_id(self) -> Option<String> {
        match self {
            FolderResolution::Existing(id) | FolderResolution::Created(id) => Some(id),
            FolderResolution::Unresolved(_) => None,
        }
    }
}

/// Operations the send pipeline needs from the library.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Library: Send + Sync {
    /// Finds a folder by exact name or id, creating it by name when absent.
    async fn find_or_create_folder(&self, name_or_id: &str) -> FolderResolution;

    /// Adds the file at `item.path`, placing it in `folder_id` when given and non-empty.
    async fn add_item_from_path(
        &self,
        item: ItemSubmission,
        folder_id: Option<String>,
    ) -> Result<Value, LibraryError>;
}

/// reqwest-backed [`Library`] with a per-instance folder cache.
pub struct LibraryClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    /// `None` until the folder tree has been fetched; an empty list after a failed fetch.
    folders: Mutex<Option<Vec<FolderInfo>>>,
}

impl LibraryClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.filter(|t| !t.is_empty());
        info!(base_url = %base_url, token_set = token.is_some(), "Initialized LibraryClient");
        LibraryClient {
            http: Client::new(),
            base_url,
            token,
            folders: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        LibraryClient::new(settings.host_url(), settings.token().map(String::from))
    }

    async fn send_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, LibraryError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, url = %url, "Sending library request");
        let response = request.send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Library request failed");
            LibraryError::Transport(e)
        })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(status = %status, url = %url, body = %text, "Library returned error status");
            return Err(LibraryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, url = %url, "Library response is not JSON");
            LibraryError::Decode(e.to_string())
        })
    }

    /// Fetches the whole folder tree, flattened depth-first.
    pub async fn list_folders(&self) -> Result<Vec<FolderInfo>, LibraryError> {
        let response = self.send_request(Method::GET, FOLDER_LIST, None).await?;
        let data = response
            .get("data")
            .ok_or_else(|| LibraryError::Decode("folder list has no `data` field".into()))?;
        let folders = flatten_folders(data);
        info!(count = folders.len(), "Fetched library folder list");
        Ok(folders)
    }

    /// Creates a folder named `name` and returns its id.
    pub async fn create_folder(&self, name: &str) -> Result<String, LibraryError> {
        if name.is_empty() {
            return Err(LibraryError::EmptyFolderName);
        }
        let body = serde_json::json!({ "folderName": name });
        let response = self.send_request(Method::POST, FOLDER_CREATE, Some(&body)).await?;
        let id = response
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(LibraryError::MissingFolderId)?;
        info!(folder_id = %id, folder_name = %name, "Created library folder");
        Ok(id.to_string())
    }

    /// Snapshot of the folder cache, `None` if not loaded yet.
    pub async fn cached_folders(&self) -> Option<Vec<FolderInfo>> {
        self.folders.lock().await.clone()
    }
}

#[async_trait]
impl Library for LibraryClient {
    async fn find_or_create_folder(&self, name_or_id: &str) -> FolderResolution {
        let mut cache = self.folders.lock().await;
        if cache.is_none() {
            let loaded = match self.list_folders().await {
                Ok(folders) => folders,
                Err(e) => {
                    warn!(error = %e, "Could not list library folders, continuing without cache");
                    Vec::new()
                }
            };
            *cache = Some(loaded);
        }
        let folders = cache.get_or_insert_with(Vec::new);

        if let Some(folder) = folders.iter().find(|f| f.matches(name_or_id)) {
            debug!(folder_id = %folder.id, folder_name = %folder.name, "Found existing folder");
            return FolderResolution::Existing(folder.id.clone());
        }

        match self.create_folder(name_or_id).await {
            Ok(id) => {
                folders.push(FolderInfo {
                    id: id.clone(),
                    name: name_or_id.to_string(),
                });
                FolderResolution::Created(id)
            }
            Err(e) => {
                warn!(error = %e, folder = %name_or_id, "Could not create folder, item goes to library root");
                FolderResolution::Unresolved(e)
            }
        }
    }

    async fn add_item_from_path(
        &self,
        mut item: ItemSubmission,
        folder_id: Option<String>,
    ) -> Result<Value, LibraryError> {
        if let Some(id) = folder_id.filter(|id| !id.is_empty()) {
            item.folder_id = Some(id);
        }
        info!(
            path = %item.path,
            tags = item.tags.len(),
            folder_id = item.folder_id.as_deref().unwrap_or(""),
            "Adding item to library"
        );
        let body = serde_json::to_value(&item).map_err(|e| LibraryError::Decode(e.to_string()))?;
        let response = self.send_request(Method::POST, ITEM_ADD_FROM_PATH, Some(&body)).await?;
        debug!(response = %response, "Library accepted item");
        Ok(response)
    }
}

/// Collects every object carrying string `id` and `name`, descending into `children`.
pub fn flatten_folders(data: &Value) -> Vec<FolderInfo> {
    fn visit(node: &Value, out: &mut Vec<FolderInfo>) {
        match node {
            Value::Object(map) => {
                if let (Some(id), Some(name)) = (
                    map.get("id").and_then(Value::as_str),
                    map.get("name").and_then(Value::as_str),
                ) {
                    out.push(FolderInfo {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
                if let Some(Value::Array(children)) = map.get("children") {
                    for child in children {
                        visit(child, out);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    visit(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    visit(data, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_folders_depth_first() {
        let data = json!([
            { "id": "A", "name": "Animals", "children": [
                { "id": "A1", "name": "Cats", "children": [
                    { "id": "A1a", "name": "Kittens", "children": [] }
                ]},
                { "id": "A2", "name": "Dogs" }
            ]},
            { "id": "B", "name": "Buildings", "children": [] },
            { "name": "no id" }
        ]);
        let names: Vec<_> = flatten_folders(&data).into_iter().map(|f| f.id).collect();
        assert_eq!(names, vec!["A", "A1", "A1a", "A2", "B"]);
    }

    #[test]
    fn folder_matches_by_name_or_id() {
        let folder = FolderInfo { id: "K1".into(), name: "Renders".into() };
        assert!(folder.matches("K1"));
        assert!(folder.matches("Renders"));
        assert!(!folder.matches("renders"));
    }

    #[test]
    fn submission_omits_absent_folder_id() {
        let item = ItemSubmission {
            path: "/out/a.png".into(),
            name: "a.png".into(),
            annotation: "".into(),
            tags: vec!["cat".into()],
            folder_id: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("folderId").is_none());
        let with_folder = ItemSubmission { folder_id: Some("F".into()), ..item };
        assert_eq!(serde_json::to_value(&with_folder).unwrap()["folderId"], json!("F"));
    }

    #[test]
    fn resolution_exposes_folder_id() {
        assert_eq!(FolderResolution::Existing("a".into()).folder_id(), Some("a"));
        assert_eq!(FolderResolution::Created("b".into()).folder_id(), Some("b"));
        assert_eq!(
            FolderResolution::Unresolved(LibraryError::MissingFolderId).folder_id(),
            None
        );
    }
}
