//! Send pipeline: validate request → read file metadata → annotation and tags →
//! folder → item submission.
//!
//! # Error Handling
//! - Missing `filename`/`subfolder` is [`SendError::InvalidRequest`], raised before
//!   any filesystem or network access.
//! - A path that does not exist is [`SendError::NotFound`].
//! - Folder resolution degrades to "no folder" and never aborts the send.
//! - Metadata decoding and item submission failures abort the send as
//!   [`SendError::Internal`].
//!
//! A library client is built per send from the settings in effect at that moment,
//! so its folder cache lives for one request only.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::library::{FolderResolution, ItemSubmission, Library, LibraryClient};
use crate::metadata::{annotation, positive_prompt, read_text_metadata, tags_from_prompt};
use crate::settings::{Settings, SettingsStore};

pub const SENT_MESSAGE: &str = "Image and metadata sent to Eagle from path";

/// Body of a send request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub subfolder: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

impl SendRequest {
    /// Request for a file on disk, split into directory and file name.
    pub fn for_path(path: &Path, folder: Option<String>) -> Self {
        SendRequest {
            filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            subfolder: path.parent().map(|p| {
                if p.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    p.to_string_lossy().into_owned()
                }
            }),
            folder,
        }
    }
}

/// Request for an automatic send of `path`, or `None` when autosend is disabled.
/// Without an explicit `folder` the configured folder name applies.
pub fn autosend_request(
    path: &Path,
    folder: Option<String>,
    settings: &Settings,
) -> Option<SendRequest> {
    if !settings.enabled() {
        return None;
    }
    let folder = folder
        .filter(|f| !f.is_empty())
        .or_else(|| settings.folder_name().map(String::from));
    Some(SendRequest::for_path(path, folder))
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Error sending to Eagle: {0}")]
    Internal(String),
}

impl SendError {
    pub fn status_code(&self) -> u16 {
        match self {
            SendError::InvalidRequest(_) => 400,
            SendError::NotFound(_) => 404,
            SendError::Internal(_) => 500,
        }
    }
}

/// What a successful send did.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    pub path: PathBuf,
    pub folder_id: Option<String>,
    pub tags: Vec<String>,
}

fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Sends one file using a [`LibraryClient`] configured from the stored settings.
pub async fn send_to_library(
    request: &SendRequest,
    store: &SettingsStore,
    csv_dir: &Path,
) -> Result<SendReport, SendError> {
    send_with(request, store, csv_dir, LibraryClient::from_settings).await
}

/// Sends one file through the library returned by `connect`, which is only called
/// once the request has been validated and settings loaded.
pub async fn send_with<L, F>(
    request: &SendRequest,
    store: &SettingsStore,
    csv_dir: &Path,
    connect: F,
) -> Result<SendReport, SendError>
where
    L: Library,
    F: FnOnce(&Settings) -> L,
{
    let (Some(filename), Some(subfolder)) = (required(&request.filename), required(&request.subfolder))
    else {
        warn!(?request, "Rejecting send request without filename or subfolder");
        return Err(SendError::InvalidRequest(
            "filename or subfolder missing".to_string(),
        ));
    };

    let absolute_path = Path::new(subfolder).join(filename);
    if !absolute_path.exists() {
        warn!(path = %absolute_path.display(), "File to send does not exist");
        return Err(SendError::NotFound(absolute_path));
    }

    let settings = store.load();
    info!(path = %absolute_path.display(), "[SEND] Starting send to library");

    let (item_annotation, tags) = {
        let path = absolute_path.clone();
        let settings = settings.clone();
        let csv_dir = csv_dir.to_path_buf();
        tokio::task::spawn_blocking(move || derive_annotation_and_tags(&path, &settings, &csv_dir))
            .await
            .map_err(|e| {
                error!(error = %e, "[SEND][ERROR] Metadata task failed");
                SendError::Internal(e.to_string())
            })??
    };
    debug!(
        annotation_len = item_annotation.len(),
        tags = ?tags,
        "[SEND] Derived annotation and tags"
    );

    let item = ItemSubmission {
        path: absolute_path.to_string_lossy().into_owned(),
        name: filename.to_string(),
        annotation: item_annotation,
        tags: tags.clone(),
        folder_id: None,
    };

    let library = connect(&settings);

    let folder_id = match required(&request.folder) {
        Some(folder) => match library.find_or_create_folder(folder).await {
            FolderResolution::Unresolved(e) => {
                warn!(folder = %folder, error = %e, "[SEND] Folder unresolved, sending without folder");
                None
            }
            resolved => {
                info!(folder = %folder, resolution = ?resolved, "[SEND] Folder resolved");
                resolved.into_folder_id()
            }
        },
        None => None,
    };

    match library.add_item_from_path(item, folder_id.clone()).await {
        Ok(_) => {
            info!(path = %absolute_path.display(), folder_id = ?folder_id, "[SEND] Item added to library");
            Ok(SendReport {
                path: absolute_path,
                folder_id,
                tags,
            })
        }
        Err(e) => {
            error!(error = %e, path = %absolute_path.display(), "[SEND][ERROR] Item submission failed");
            Err(SendError::Internal(e.to_string()))
        }
    }
}

/// PNG decoding and CSV loading are blocking work.
fn derive_annotation_and_tags(
    path: &Path,
    settings: &Settings,
    csv_dir: &Path,
) -> Result<(String, Vec<String>), SendError> {
    let metadata = read_text_metadata(path).map_err(|e| {
        error!(error = %e, path = %path.display(), "[SEND][ERROR] Failed to read image metadata");
        SendError::Internal(e.to_string())
    })?;
    let parameters_text = metadata.parameters();
    let positive = positive_prompt(parameters_text);

    let item_annotation = annotation(settings.annotation_style(), parameters_text, metadata.prompt());
    let tags = tags_from_prompt(
        settings.tag_style(),
        &positive,
        csv_dir,
        settings.tags_csv(),
        settings.alias_mode(),
    );
    Ok((item_annotation, tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(SendError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(SendError::NotFound(PathBuf::from("/x")).status_code(), 404);
        assert_eq!(SendError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn messages_match_http_bodies() {
        assert_eq!(
            SendError::InvalidRequest("filename or subfolder missing".into()).to_string(),
            "Invalid request: filename or subfolder missing"
        );
        assert_eq!(
            SendError::NotFound(PathBuf::from("/out/a.png")).to_string(),
            "File not found: /out/a.png"
        );
    }

    #[test]
    fn request_for_path_splits_directory_and_name() {
        let req = SendRequest::for_path(Path::new("/out/sub/a.png"), Some("Renders".into()));
        assert_eq!(req.filename.as_deref(), Some("a.png"));
        assert_eq!(req.subfolder.as_deref(), Some("/out/sub"));
        assert_eq!(req.folder.as_deref(), Some("Renders"));

        let bare = SendRequest::for_path(Path::new("a.png"), None);
        assert_eq!(bare.subfolder.as_deref(), Some("."));
    }

    #[test]
    fn autosend_request_uses_configured_folder() {
        let mut settings = Settings::default();
        settings.set(crate::settings::FOLDER_NAME, serde_json::json!("Renders"));

        let req = autosend_request(Path::new("/out/a.png"), None, &settings).unwrap();
        assert_eq!(req.folder.as_deref(), Some("Renders"));

        let explicit =
            autosend_request(Path::new("/out/a.png"), Some("Sketches".into()), &settings).unwrap();
        assert_eq!(explicit.folder.as_deref(), Some("Sketches"));

        let unset = autosend_request(Path::new("/out/a.png"), None, &Settings::default()).unwrap();
        assert_eq!(unset.folder, None);
    }

    #[test]
    fn autosend_request_is_none_when_disabled() {
        let mut settings = Settings::default();
        settings.set(crate::settings::ENABLE, serde_json::json!(false));
        settings.set(crate::settings::FOLDER_NAME, serde_json::json!("Renders"));
        assert_eq!(autosend_request(Path::new("/out/a.png"), None, &settings), None);
    }

    #[test]
    fn request_ignores_unknown_fields() {
        let req: SendRequest =
            serde_json::from_str(r#"{"filename":"a.png","subfolder":"out","type":"output","folder":null}"#)
                .unwrap();
        assert_eq!(req.filename.as_deref(), Some("a.png"));
        assert_eq!(req.folder, None);
    }
}
