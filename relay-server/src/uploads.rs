//! Multipart upload endpoints.
//!
//! Clients that cannot base64-encode images themselves post the file here and
//! get the encoded payload back for use as `image_data`.

use crate::routes::{AppState, ErrorResponse};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Name of the multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file provided in field '{FILE_FIELD}'")]
    MissingFile,

    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },

    #[error("Request body exceeds the upload limit")]
    BodyTooLarge,

    #[error("Malformed multipart body: {0}")]
    Multipart(String),
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::BodyTooLarge
        } else {
            Self::Multipart(err.body_text())
        }
    }
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } | Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::TooLarge { .. } | Self::BodyTooLarge => "too_large",
            Self::Multipart(_) => "bad_multipart",
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Metadata echoed for an uploaded file.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

struct UploadedFile {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Pull the `file` field out of the form, enforcing `max_bytes`.
async fn read_file(mut multipart: Multipart, max_bytes: usize) -> Result<UploadedFile, UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge { limit: max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }

    Err(UploadError::MissingFile)
}

/// `POST /upload`: echo file metadata.
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    let file = read_file(multipart, state.config.uploads.max_bytes).await?;
    tracing::info!(
        filename = ?file.filename,
        content_type = ?file.content_type,
        size = file.bytes.len(),
        "File uploaded"
    );

    Ok(Json(UploadResponse {
        filename: file.filename,
        content_type: file.content_type,
        size: file.bytes.len(),
        base64: None,
    }))
}

/// `POST /upload/base64`: return the file base64-encoded.
pub async fn upload_base64_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    let file = read_file(multipart, state.config.uploads.max_bytes).await?;
    tracing::info!(
        filename = ?file.filename,
        size = file.bytes.len(),
        "File uploaded for base64 encoding"
    );

    Ok(Json(UploadResponse {
        filename: file.filename,
        content_type: file.content_type,
        size: file.bytes.len(),
        base64: Some(STANDARD.encode(&file.bytes)),
    }))
}
