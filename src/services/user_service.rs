use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{generate_jwt, Claims, JwtError};
use crate::config::SecurityConfig;
use crate::database::manager::DatabaseError;
use crate::database::models::{NewUser, User};
use crate::database::repository::UserStore;
use crate::types::{Actor, Role};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Incorrect credentials")]
    InvalidCredentials,
    #[error("User {0} not found")]
    NotFound(i64),
    #[error("Action not permitted: {0}")]
    Authorization(String),
    #[error("Role {0} cannot be self-assigned")]
    PrivilegedSignup(Role),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Token error: {0}")]
    Token(#[from] JwtError),
    #[error("Database error: {0}")]
    Database(#[source] DatabaseError),
}

impl From<DatabaseError> for UserError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(message) => UserError::Conflict(message),
            other => UserError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(alias = "hashed_password")]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    security: SecurityConfig,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, UserError> {
        validate_username_format(&request.username).map_err(UserError::Validation)?;
        validate_email_format(&request.email).map_err(UserError::Validation)?;
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let role = request.role.unwrap_or_default();
        if role.is_elevated() && !self.security.allow_privileged_signup {
            warn!("Refused self-registration of '{}' with role {}", request.username, role);
            return Err(UserError::PrivilegedSignup(role));
        }

        let hashed_password = hash_password(request.password, self.security.bcrypt_cost).await?;
        let user = self
            .store
            .create_user(NewUser {
                username: request.username,
                email: request.email.trim().to_lowercase(),
                hashed_password,
                role,
            })
            .await?;

        info!("Registered user {} ({}) as {}", user.id, user.username, user.role);
        Ok(user)
    }

    /// Exchange email and password for a bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<Token, UserError> {
        let email = email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(UserError::InvalidCredentials)?;

        if !verify_password(password.to_string(), user.hashed_password.clone()).await? {
            warn!("Failed login for user {}", user.id);
            return Err(UserError::InvalidCredentials);
        }

        let claims = Claims::new(user.email.clone(), user.id, user.role, self.security.jwt_expiry_hours);
        let access_token = generate_jwt(&claims, &self.security)?;

        Ok(Token {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.security.jwt_expiry_hours * 3600,
        })
    }

    /// Lookup without access checks, for token validation
    pub async fn find(&self, user_id: i64) -> Result<Option<User>, UserError> {
        Ok(self.store.find_user_by_id(user_id).await?)
    }

    pub async fn get_user(&self, user_id: i64, actor: &Actor) -> Result<User, UserError> {
        if !actor.can_access(user_id) {
            return Err(UserError::Authorization(format!("user {} cannot view user {}", actor.user_id, user_id)));
        }
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound(user_id))
    }

    pub async fn delete_user(&self, user_id: i64, actor: &Actor) -> Result<(), UserError> {
        if !actor.is_admin() {
            return Err(UserError::Authorization("only administrators can delete users".to_string()));
        }
        if !self.store.delete_user(user_id).await? {
            return Err(UserError::NotFound(user_id));
        }

        info!("User {} deleted by admin {}", user_id, actor.user_id);
        Ok(())
    }
}

/// Username: 3 to 50 characters of letters, digits, `_` or `-`, starting alphanumeric
pub fn validate_username_format(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    let length = username.chars().count();
    if length < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if length > 50 {
        return Err("Username must be at most 50 characters".to_string());
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err("Username can only contain letters, numbers, underscore, and hyphen".to_string());
    }
    if !username.chars().next().is_some_and(char::is_alphanumeric) {
        return Err("Username must start with a letter or number".to_string());
    }
    Ok(())
}

pub fn validate_email_format(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email cannot be empty".to_string());
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| "Invalid email format".to_string())?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err("Invalid email format".to_string());
    }
    // Domain needs a dot with something on both sides
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err("Invalid email format".to_string()),
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, UserError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| UserError::Hashing(e.to_string()))?
        .map_err(|e| UserError::Hashing(e.to_string()))
}

async fn verify_password(password: String, hashed: String) -> Result<bool, UserError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| UserError::Hashing(e.to_string()))?
        .map_err(|e| UserError::Hashing(e.to_string()))
}
