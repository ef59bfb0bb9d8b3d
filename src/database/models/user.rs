use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// User row before the store assigns id and creation time
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}
