use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use vouch_types::api::{FileInfo, UploadResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// 10 MB upload limit for images
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Multipart framing on top of the file itself
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

const UPLOAD_FIELD: &str = "image";

/// Map an accepted mime type to the extension used on disk.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// POST /api/upload: multipart field `image`. The file is read fully and
/// checked before anything is written, so a rejected upload leaves no trace.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let limit = state.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let mime_type = field.content_type().unwrap_or_default().to_string();
        let ext = extension_for(&mime_type).ok_or_else(|| {
            ApiError::Upload(format!(
                "Unsupported file type '{}': only JPEG, PNG and GIF images are allowed",
                mime_type
            ))
        })?;
        let original_name = field.file_name().map(str::to_string);

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if bytes.is_empty() {
            return Err(ApiError::Upload("Uploaded file is empty".into()));
        }
        if bytes.len() > limit {
            return Err(too_large(limit));
        }

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
            error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
            ApiError::Internal("upload directory unavailable".into())
        })?;

        let path = state.upload_dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create file {}: {}", path.display(), e);
            ApiError::Internal("could not store upload".into())
        })?;
        let written = async {
            file.write_all(&bytes).await?;
            file.flush().await
        };
        written.await.map_err(|e| {
            error!("Failed to write file {}: {}", path.display(), e);
            ApiError::Internal("could not store upload".into())
        })?;

        let sha256 = hex::encode(Sha256::digest(&bytes));
        info!("Stored upload {} ({} bytes, {})", filename, bytes.len(), mime_type);

        return Ok((
            StatusCode::OK,
            Json(UploadResponse {
                success: true,
                image_url: format!("/uploads/{}", filename),
                file_info: FileInfo {
                    filename,
                    original_name,
                    mime_type,
                    size: bytes.len() as u64,
                    sha256,
                },
            }),
        ));
    }

    Err(ApiError::Upload(format!(
        "No file uploaded: expected a multipart field named '{}'",
        UPLOAD_FIELD
    )))
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        ApiError::Upload(err.body_text())
    }
}

fn too_large(limit: usize) -> ApiError {
    ApiError::Upload(format!(
        "File too large: the size limit is {} MB",
        limit / (1024 * 1024)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_images_are_accepted() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/gif"), Some("gif"));
        assert_eq!(extension_for("application/pdf"), None);
        assert_eq!(extension_for(""), None);
    }

    #[test]
    fn size_error_mentions_the_limit() {
        assert_eq!(
            too_large(MAX_UPLOAD_BYTES).to_string(),
            "File too large: the size limit is 10 MB"
        );
    }
}
