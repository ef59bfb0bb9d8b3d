use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Network {
    pub id: i64,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewNetwork {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
}

/// One ingest or replace call: an immutable set of edges sharing `started_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Generation {
    pub network_id: i64,
    pub generation: i32,
    pub started_at: DateTime<Utc>,
    pub edge_count: i64,
}
