use crate::error::AppError;
use rocket::fs::TempFile;
use rocket::tokio::fs;
use std::path::PathBuf;
use tracing::{info, instrument};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "png", "gif", "pdf"];

pub struct UploadConfig {
    pub dir: PathBuf,
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        Self { dir: PathBuf::from(dir) }
    }
}

/// Accepts a filename when its extension (dot-stripped, case-insensitive) is
/// in the whitelist.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Validates the upload against the extension whitelist, then copies it into
/// the upload directory under a generated name. Nothing is stored for a
/// rejected file.
#[instrument(skip_all)]
pub async fn store_upload(
    config: &UploadConfig,
    file: &mut TempFile<'_>,
) -> Result<String, AppError> {
    let original = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default();

    if !allowed_file(&original) {
        return Err(AppError::Validation(format!(
            "File type not allowed: '{}'",
            original
        )));
    }

    let extension = original
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    let stored = format!("{}.{}", Uuid::new_v4(), extension);

    fs::create_dir_all(&config.dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

    let dest = config.dir.join(&stored);
    file.copy_to(&dest)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    info!(file = %stored, "Stored uploaded material");

    Ok(stored)
}

/// Best-effort removal of a stored file; a miss is not an error.
pub async fn remove_stored_file(config: &UploadConfig, stored: &str) {
    let path = config.dir.join(stored);
    if let Err(e) = fs::remove_file(&path).await {
        tracing::debug!(file = %stored, error = %e, "Could not remove stored file");
    }
}
