//! Local filesystem storage for files attached to submissions.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use super::domain::FileAttachment;

/// Writes uploads under a root directory using generated, collision-free names.
#[derive(Debug, Clone)]
pub struct LocalUploadStore {
    root: PathBuf,
}

impl LocalUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store the bytes of one upload and describe where they went.
    ///
    /// The caller-supplied name is kept only as display metadata.
    pub async fn persist(
        &self,
        original_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<FileAttachment> {
        fs::create_dir_all(&self.root).await?;

        let original_name = display_name(original_name);
        let stored_name = format!(
            "{}-{}{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension_of(&original_name)
        );
        let path = self.root.join(stored_name);
        fs::write(&path, bytes).await?;

        Ok(FileAttachment {
            mime_type: mime_type_for(&original_name, content_type),
            original_name,
            storage_path: path.to_string_lossy().into_owned(),
        })
    }

    /// Remove a stored upload whose submission was rejected.
    pub async fn discard(&self, attachment: &FileAttachment) -> io::Result<()> {
        match fs::remove_file(&attachment.storage_path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn display_name(original_name: Option<&str>) -> String {
    // Browsers on some platforms send the full client path.
    original_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string()
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn mime_type_for(name: &str, content_type: Option<&str>) -> String {
    content_type
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM)
        .unwrap_or_else(|| mime_guess::from_path(name).first_or_octet_stream())
        .essence_str()
        .to_string()
}
