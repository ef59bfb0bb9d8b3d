use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder, Transaction};

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{EdgeRecord, EdgeVersion, Generation, Network, NewNetwork, NewUser, User};
use crate::database::repository::{EdgeSelector, EdgeStore, UnitOfWork, UserStore};
use crate::network::geometry::{Geometry, SRID};

/// Rows per multi-row INSERT; 14 binds each keeps a statement under the 65535 parameter limit
const EDGE_INSERT_CHUNK: usize = 4000;

const EDGE_COLUMNS: &str = r#"id, name, "ref", lanes, oneway, length, width, tunnel, extra_properties,
    ST_AsGeoJSON(geometry)::jsonb AS geometry, is_current, "timestamp", generation, network_id, user_id"#;

const NETWORK_COLUMNS: &str = r#"id, name, "timestamp", user_id"#;

const USER_COLUMNS: &str = "id, username, email, hashed_password, role, created_at";

#[derive(FromRow)]
struct EdgeRow {
    id: i64,
    name: Option<String>,
    #[sqlx(rename = "ref")]
    reference: Option<String>,
    lanes: Option<String>,
    oneway: Option<bool>,
    length: Option<f64>,
    width: Option<Vec<f64>>,
    tunnel: Option<String>,
    extra_properties: Json<Map<String, Value>>,
    geometry: Json<Geometry>,
    is_current: bool,
    timestamp: DateTime<Utc>,
    generation: i32,
    network_id: i64,
    user_id: i64,
}

impl From<EdgeRow> for EdgeVersion {
    fn from(row: EdgeRow) -> Self {
        EdgeVersion {
            id: row.id,
            edge: EdgeRecord {
                name: row.name,
                reference: row.reference,
                lanes: row.lanes,
                oneway: row.oneway,
                length: row.length,
                width: row.width,
                tunnel: row.tunnel,
                extra_properties: row.extra_properties.0,
                geometry: row.geometry.0,
                is_current: row.is_current,
                timestamp: row.timestamp,
                generation: row.generation,
                network_id: row.network_id,
                user_id: row.user_id,
            },
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    hashed_password: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(DatabaseError::QueryError)?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            hashed_password: row.hashed_password,
            role,
            created_at: row.created_at,
        })
    }
}

/// Map unique-constraint violations to `Conflict`, everything else passes through
fn conflict_or(err: sqlx::Error, describe: impl FnOnce(Option<&str>) -> String) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DatabaseError::Conflict(describe(db.constraint())),
        _ => DatabaseError::Sqlx(err),
    }
}

/// PostgreSQL + PostGIS store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_network(&mut self, network: NewNetwork) -> Result<Network, DatabaseError> {
        let sql = format!(
            r#"INSERT INTO road_networks (name, "timestamp", user_id) VALUES ($1, $2, $3) RETURNING {}"#,
            NETWORK_COLUMNS
        );
        let network = sqlx::query_as::<_, Network>(&sql)
            .bind(network.name)
            .bind(network.timestamp)
            .bind(network.user_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(network)
    }

    async fn lock_network(&mut self, network_id: i64) -> Result<Option<Network>, DatabaseError> {
        let sql = format!("SELECT {} FROM road_networks WHERE id = $1 FOR UPDATE", NETWORK_COLUMNS);
        let network = sqlx::query_as::<_, Network>(&sql)
            .bind(network_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(network)
    }

    async fn latest_generation(&mut self, network_id: i64) -> Result<Option<Generation>, DatabaseError> {
        let generation = sqlx::query_as::<_, Generation>(
            "SELECT network_id, generation, started_at, edge_count
             FROM network_generations
             WHERE network_id = $1
             ORDER BY generation DESC
             LIMIT 1",
        )
        .bind(network_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(generation)
    }

    async fn insert_generation(&mut self, generation: Generation) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO network_generations (network_id, generation, started_at, edge_count)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(generation.network_id)
        .bind(generation.generation)
        .bind(generation.started_at)
        .bind(generation.edge_count)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            conflict_or(e, |_| {
                format!(
                    "generation {} of network {} already exists",
                    generation.generation, generation.network_id
                )
            })
        })?;
        Ok(())
    }

    async fn retire_current(&mut self, network_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE road_edges SET is_current = FALSE WHERE network_id = $1 AND is_current")
            .bind(network_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_edges(&mut self, edges: Vec<EdgeRecord>) -> Result<u64, DatabaseError> {
        let mut inserted = 0;
        for chunk in edges.chunks(EDGE_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"INSERT INTO road_edges (name, "ref", lanes, oneway, length, width, tunnel, extra_properties,
                    geometry, is_current, "timestamp", generation, network_id, user_id) "#,
            );
            builder.push_values(chunk, |mut row, edge| {
                row.push_bind(edge.name.clone())
                    .push_bind(edge.reference.clone())
                    .push_bind(edge.lanes.clone())
                    .push_bind(edge.oneway)
                    .push_bind(edge.length)
                    .push_bind(edge.width.clone())
                    .push_bind(edge.tunnel.clone())
                    .push_bind(Json(edge.extra_properties.clone()))
                    .push("ST_SetSRID(ST_GeomFromGeoJSON(")
                    .push_bind_unseparated(edge.geometry.to_string())
                    .push_unseparated(format!("), {})", SRID))
                    .push_bind(edge.is_current)
                    .push_bind(edge.timestamp)
                    .push_bind(edge.generation)
                    .push_bind(edge.network_id)
                    .push_bind(edge.user_id);
            });
            let result = builder.build().execute(&mut *self.tx).await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl EdgeStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_network(&self, network_id: i64) -> Result<Option<Network>, DatabaseError> {
        let sql = format!("SELECT {} FROM road_networks WHERE id = $1", NETWORK_COLUMNS);
        let network = sqlx::query_as::<_, Network>(&sql)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(network)
    }

    async fn list_networks(&self, owner_id: i64) -> Result<Vec<Network>, DatabaseError> {
        let sql = format!("SELECT {} FROM road_networks WHERE user_id = $1 ORDER BY id", NETWORK_COLUMNS);
        let networks = sqlx::query_as::<_, Network>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(networks)
    }

    async fn delete_network(&self, network_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM road_networks WHERE id = $1")
            .bind(network_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_generations(&self, network_id: i64) -> Result<Vec<Generation>, DatabaseError> {
        let generations = sqlx::query_as::<_, Generation>(
            "SELECT network_id, generation, started_at, edge_count
             FROM network_generations
             WHERE network_id = $1
             ORDER BY generation",
        )
        .bind(network_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(generations)
    }

    async fn generation_at(&self, network_id: i64, at: DateTime<Utc>) -> Result<Option<Generation>, DatabaseError> {
        let generation = sqlx::query_as::<_, Generation>(
            "SELECT network_id, generation, started_at, edge_count
             FROM network_generations
             WHERE network_id = $1 AND started_at <= $2
             ORDER BY started_at DESC, generation DESC
             LIMIT 1",
        )
        .bind(network_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(generation)
    }

    async fn select_edges(&self, network_id: i64, selector: EdgeSelector) -> Result<Vec<EdgeVersion>, DatabaseError> {
        let rows = match selector {
            EdgeSelector::Current => {
                let sql = format!(
                    "SELECT {} FROM road_edges WHERE network_id = $1 AND is_current ORDER BY id",
                    EDGE_COLUMNS
                );
                sqlx::query_as::<_, EdgeRow>(&sql)
                    .bind(network_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            EdgeSelector::Generation(generation) => {
                let sql = format!(
                    "SELECT {} FROM road_edges WHERE network_id = $1 AND generation = $2 ORDER BY id",
                    EDGE_COLUMNS
                );
                sqlx::query_as::<_, EdgeRow>(&sql)
                    .bind(network_id)
                    .bind(generation)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(EdgeVersion::from).collect())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let sql = format!(
            "INSERT INTO users (username, email, hashed_password, role) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.hashed_password)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                conflict_or(e, |constraint| match constraint {
                    Some(c) if c.contains("email") => format!("email '{}' is already registered", user.email),
                    _ => format!("username '{}' is already registered", user.username),
                })
            })?;
        row.try_into()
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn delete_user(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
