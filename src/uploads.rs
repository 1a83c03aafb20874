use std::path::Path;

use anyhow::Result;
use axum::extract::Multipart;
use tokio::fs;
use uuid::Uuid;

use crate::error::AppError;

/// Ceiling for multipart image bodies.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Returns the lowercased extension when the filename carries one from the
/// allow-list, `None` otherwise.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

/// Pulls the `image` file field out of a multipart body.
pub async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("malformed multipart body".into()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(AppError::Validation("image filename is required".into()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::Validation("failed to read image data".into()))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(AppError::Validation(
        "multipart field 'image' is required".into(),
    ))
}

/// Writes image bytes under `<root>/<subdir>/` with a generated name and
/// returns the relative path stored as the image reference.
pub async fn store_image(root: &str, subdir: &str, extension: &str, bytes: &[u8]) -> Result<String> {
    let dir = Path::new(root).join(subdir);
    fs::create_dir_all(&dir).await?;

    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    fs::write(dir.join(&filename), bytes).await?;

    Ok(format!("{subdir}/{filename}"))
}

/// Creates the upload directories at startup so the first upload never races
/// directory creation.
pub async fn ensure_upload_dirs(root: &str) -> Result<()> {
    for subdir in ["categories", "products"] {
        fs::create_dir_all(Path::new(root).join(subdir)).await?;
    }
    Ok(())
}
