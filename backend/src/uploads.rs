use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use log::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// URL prefix under which `UploadStore::root` is served.
pub const UPLOADS_MOUNT: &str = "uploads";

const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("application/pdf", "pdf"),
];

/// What the upload collaborator hands back. `path` is relative to the public
/// base URL and is trusted verbatim by the booking service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub filename: String,
    pub mimetype: String,
}

pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads the multipart field `field_name` and writes it under
    /// `<root>/<category>/`. Other fields are skipped.
    pub async fn save_field(
        &self,
        multipart: &mut Multipart,
        field_name: &str,
        category: &str,
    ) -> Result<StoredFile, ApiError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("Malformed upload: {}", e)))?
        {
            if field.name() != Some(field_name) {
                continue;
            }

            let mimetype = field.content_type().unwrap_or_default().to_string();
            let extension = extension_for(&mimetype).ok_or_else(|| {
                ApiError::Validation(format!(
                    "Unsupported file type '{}'; allowed: jpeg, png, webp, pdf",
                    mimetype
                ))
            })?;

            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Failed to read upload: {}", e)))?;
            if data.is_empty() {
                return Err(ApiError::Validation("Uploaded file is empty".into()));
            }
            if data.len() > self.max_bytes {
                return Err(ApiError::Validation(format!(
                    "File too large: {} bytes (max {})",
                    data.len(),
                    self.max_bytes
                )));
            }

            let filename = format!("{}.{}", Uuid::new_v4(), extension);
            let dir = self.root.join(category);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ApiError::Upstream(format!("Failed to create upload dir: {}", e)))?;
            tokio::fs::write(dir.join(&filename), &data)
                .await
                .map_err(|e| ApiError::Upstream(format!("Failed to store upload: {}", e)))?;

            let path = Path::new(UPLOADS_MOUNT)
                .join(category)
                .join(&filename)
                .to_string_lossy()
                .into_owned();
            info!("Stored {} upload {} ({} bytes)", category, path, data.len());

            return Ok(StoredFile {
                path,
                filename,
                mimetype,
            });
        }

        Err(ApiError::Validation(format!(
            "Missing '{}' file in multipart form",
            field_name
        )))
    }

    /// Removes a stored file that ended up not being attached to anything.
    pub async fn discard(&self, file: &StoredFile) {
        let relative = file
            .path
            .replace('\\', "/")
            .trim_start_matches(&format!("{}/", UPLOADS_MOUNT))
            .to_string();
        let disk_path = self.root.join(relative);
        if let Err(e) = tokio::fs::remove_file(&disk_path).await {
            warn!("Could not discard upload {}: {}", disk_path.display(), e);
        }
    }
}

fn extension_for(mimetype: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(mimetype))
        .map(|(_, ext)| *ext)
}

/// Joins a base URL and a storage path with exactly one `/`, normalizing
/// backslashes in the path.
pub fn public_url(base: &str, path: &str) -> String {
    let normalized = path.replace('\\', "/");
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        normalized.trim_start_matches('/')
    )
}
