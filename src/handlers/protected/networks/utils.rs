use axum::extract::{multipart::MultipartError, Multipart};
use axum::http::StatusCode;
use axum::body::Bytes;

use crate::error::ApiError;

/// Name of the multipart field carrying the GeoJSON document
pub const UPLOAD_FIELD: &str = "file";

/// Read the `file` field of a multipart upload. Other fields are skipped.
pub async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() {
                return Err(ApiError::bad_request("Uploaded file is empty"));
            }
            return Ok(bytes);
        }
    }
    Err(ApiError::bad_request(format!("Missing multipart field '{}'", UPLOAD_FIELD)))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Uploaded file exceeds the request size limit")
    } else {
        ApiError::bad_request(format!("Malformed multipart upload: {}", err.body_text()))
    }
}
