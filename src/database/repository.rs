use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::manager::DatabaseError;
use crate::database::models::{EdgeRecord, EdgeVersion, Generation, Network, NewNetwork, NewUser, User};

/// Which rows of a network's edge log to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSelector {
    /// Rows flagged `is_current`
    Current,
    /// Every row of one generation, whatever its current flag
    Generation(i32),
}

/// One store transaction. Nothing is visible to other readers until `commit`.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_network(&mut self, network: NewNetwork) -> Result<Network, DatabaseError>;

    /// Fetch the network and hold it for the rest of the unit of work
    async fn lock_network(&mut self, network_id: i64) -> Result<Option<Network>, DatabaseError>;

    async fn latest_generation(&mut self, network_id: i64) -> Result<Option<Generation>, DatabaseError>;

    async fn insert_generation(&mut self, generation: Generation) -> Result<(), DatabaseError>;

    /// Flip every current row of the network to historical. Returns rows touched.
    async fn retire_current(&mut self, network_id: i64) -> Result<u64, DatabaseError>;

    /// Append edges in one batch. Returns rows inserted.
    async fn insert_edges(&mut self, edges: Vec<EdgeRecord>) -> Result<u64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Networks, generations and the append-only edge log
#[async_trait]
pub trait EdgeStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError>;

    async fn find_network(&self, network_id: i64) -> Result<Option<Network>, DatabaseError>;

    async fn list_networks(&self, owner_id: i64) -> Result<Vec<Network>, DatabaseError>;

    /// Delete a network together with its generations and edges
    async fn delete_network(&self, network_id: i64) -> Result<bool, DatabaseError>;

    async fn list_generations(&self, network_id: i64) -> Result<Vec<Generation>, DatabaseError>;

    /// Latest generation whose `started_at` is on or before `at`
    async fn generation_at(&self, network_id: i64, at: DateTime<Utc>) -> Result<Option<Generation>, DatabaseError>;

    async fn select_edges(&self, network_id: i64, selector: EdgeSelector) -> Result<Vec<EdgeVersion>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, DatabaseError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Delete a user and, by cascade, everything they own
    async fn delete_user(&self, user_id: i64) -> Result<bool, DatabaseError>;
}
