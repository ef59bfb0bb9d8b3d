// handlers/protected/session/whoami.rs - GET /auth/whoami handler

use axum::Extension;

use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};

/// GET /auth/whoami - the account behind the bearer token
pub async fn whoami_get(Extension(CurrentUser(user)): Extension<CurrentUser>) -> ApiResult<User> {
    Ok(ApiResponse::success(user))
}
