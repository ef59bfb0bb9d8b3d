use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::auth::AuthUser;
use crate::app::AppState;
use crate::database::models::User;
use crate::error::ApiError;
use crate::types::Actor;

/// The user behind the bearer token, as currently stored
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.0.id, self.0.role)
    }
}

/// Middleware that checks the token subject still exists with the same email and role.
/// Injects `CurrentUser` and `Actor` for handlers.
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;

    let user = state.users.find(auth_user.user_id).await?.ok_or_else(|| {
        tracing::warn!("Token for user {} refers to a deleted account", auth_user.user_id);
        ApiError::unauthorized("Failed to validate the provided credentials")
    })?;

    if user.email != auth_user.email {
        tracing::warn!(
            "User validation failed: token subject '{}' doesn't match stored email of user {}",
            auth_user.email,
            user.id
        );
        return Err(ApiError::unauthorized("User authentication mismatch"));
    }

    if user.role != auth_user.role {
        tracing::warn!(
            "User validation failed: token role {} doesn't match stored role {} for user {}",
            auth_user.role,
            user.role,
            user.id
        );
        return Err(ApiError::unauthorized("User role changed, please log in again"));
    }

    tracing::debug!("User validation successful: {} ({}) as {}", user.username, user.id, user.role);

    let current = CurrentUser(user);
    request.extensions_mut().insert(current.actor());
    request.extensions_mut().insert(current);

    Ok(next.run(request).await)
}
