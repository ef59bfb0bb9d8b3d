use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Wrapper for API responses that adds the success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: StatusCode,
    pub location: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: StatusCode::OK,
            location: None,
        }
    }

    /// Create a 201 Created response pointing at the new resource
    pub fn created(data: T, location: impl Into<String>) -> Self {
        Self {
            data,
            status_code: StatusCode::CREATED,
            location: Some(location.into()),
        }
    }
}

impl ApiResponse<()> {
    /// Create a 204 No Content response
    pub fn no_content() -> Self {
        Self {
            data: (),
            status_code: StatusCode::NO_CONTENT,
            location: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        if self.status_code == StatusCode::NO_CONTENT {
            return self.status_code.into_response();
        }

        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": true,
                        "message": "Failed to serialize response data",
                        "code": "INTERNAL_SERVER_ERROR"
                    })),
                )
                    .into_response();
            }
        };

        let envelope = json!({
            "success": true,
            "data": data_value
        });

        let mut response = (self.status_code, Json(envelope)).into_response();
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
