use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::{validate_jwt, Claims};
use crate::error::ApiError;
use crate::types::Role;

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub email: String,
    pub user_id: i64,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            email: claims.sub,
            user_id: claims.user_id,
            role: claims.role,
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;
    let claims = validate_jwt(&token, &state.config.security).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_tokens() {
        let mut headers = HeaderMap::new();
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_jwt_from_headers(&headers).unwrap(), "abc.def.ghi");
    }
}
