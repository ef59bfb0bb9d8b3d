// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::State, Form};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::Token;

/// OAuth2 password-grant style form; `username` carries the email
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// POST /auth/login - authenticate and return a bearer token
pub async fn login_post(State(state): State<AppState>, Form(form): Form<LoginForm>) -> ApiResult<Token> {
    let token = state.users.login(&form.username, &form.password).await?;
    Ok(ApiResponse::success(token))
}
