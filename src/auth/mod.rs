use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::types::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User email, the login identifier
    pub sub: String,
    pub user_id: i64,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(email: String, user_id: i64, role: Role, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: email,
            user_id,
            role,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid JWT token: {0}")]
    Invalid(String),
}

pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str, security: &SecurityConfig) -> Result<Claims, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.leeway = 0;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn security() -> SecurityConfig {
        AppConfig::development().security
    }

    #[test]
    fn round_trips_claims() {
        let security = security();
        let claims = Claims::new("ada@example.com".to_string(), 5, Role::Admin, 1);
        let token = generate_jwt(&claims, &security).unwrap();

        let decoded = validate_jwt(&token, &security).unwrap();
        assert_eq!(decoded.sub, "ada@example.com");
        assert_eq!(decoded.user_id, 5);
        assert_eq!(decoded.role, Role::Admin);
        assert!(decoded.exp > decoded.iat);
    }

    #[test]
    fn rejects_expired_tokens() {
        let security = security();
        let mut claims = Claims::new("ada@example.com".to_string(), 5, Role::User, 1);
        claims.iat -= 7200;
        claims.exp = Utc::now().timestamp() - 60;
        let token = generate_jwt(&claims, &security).unwrap();

        assert!(matches!(validate_jwt(&token, &security), Err(JwtError::Expired)));
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let mut other = security();
        other.jwt_secret = "some-other-secret".to_string();
        let claims = Claims::new("ada@example.com".to_string(), 5, Role::User, 1);
        let token = generate_jwt(&claims, &other).unwrap();

        assert!(matches!(validate_jwt(&token, &security()), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn refuses_empty_secret() {
        let mut security = security();
        security.jwt_secret.clear();
        let claims = Claims::new("ada@example.com".to_string(), 5, Role::User, 1);
        assert!(matches!(generate_jwt(&claims, &security), Err(JwtError::InvalidSecret)));
    }
}
