use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::manager::DatabaseError;
use crate::database::models::{EdgeRecord, EdgeVersion, Generation, Network, NewNetwork, NewUser, User};
use crate::database::repository::{EdgeSelector, EdgeStore, UnitOfWork, UserStore};

#[derive(Debug, Default)]
struct MemoryState {
    next_user_id: i64,
    next_network_id: i64,
    next_edge_id: i64,
    users: BTreeMap<i64, User>,
    networks: BTreeMap<i64, Network>,
    generations: Vec<Generation>,
    edges: Vec<EdgeVersion>,
}

impl MemoryState {
    fn remove_network(&mut self, network_id: i64) -> bool {
        let existed = self.networks.remove(&network_id).is_some();
        self.generations.retain(|g| g.network_id != network_id);
        self.edges.retain(|e| e.edge.network_id != network_id);
        existed
    }
}

/// In-process store. Units of work stage their writes and apply them atomically on commit.
///
/// `lock_network` takes no lock; instead commit rejects a generation that another
/// unit of work committed first, the way the `(network_id, generation)` key does
/// in PostgreSQL. Ids come from counters that never rewind, so a rolled-back unit
/// of work leaves gaps exactly like a sequence does.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    fail_edge_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `insert_edges` fail until switched off again
    pub fn fail_edge_inserts(&self, fail: bool) {
        self.fail_edge_inserts.store(fail, Ordering::SeqCst);
    }

    /// Total rows in the edge log, across networks
    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }

    pub async fn network_count(&self) -> usize {
        self.state.read().await.networks.len()
    }
}

enum StagedWrite {
    Network(Network),
    Generation(Generation),
    Retire(i64),
    Edges(Vec<EdgeVersion>),
}

struct MemoryUnitOfWork {
    state: Arc<RwLock<MemoryState>>,
    fail_edge_inserts: Arc<AtomicBool>,
    staged: Vec<StagedWrite>,
}

impl MemoryUnitOfWork {
    fn staged_network(&self, network_id: i64) -> Option<&Network> {
        self.staged.iter().find_map(|w| match w {
            StagedWrite::Network(n) if n.id == network_id => Some(n),
            _ => None,
        })
    }

    fn staged_generations(&self, network_id: i64) -> impl Iterator<Item = &Generation> {
        self.staged.iter().filter_map(move |w| match w {
            StagedWrite::Generation(g) if g.network_id == network_id => Some(g),
            _ => None,
        })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_network(&mut self, network: NewNetwork) -> Result<Network, DatabaseError> {
        let id = {
            let mut state = self.state.write().await;
            state.next_network_id += 1;
            state.next_network_id
        };
        let network = Network {
            id,
            name: network.name,
            timestamp: network.timestamp,
            user_id: network.user_id,
        };
        self.staged.push(StagedWrite::Network(network.clone()));
        Ok(network)
    }

    async fn lock_network(&mut self, network_id: i64) -> Result<Option<Network>, DatabaseError> {
        if let Some(network) = self.staged_network(network_id) {
            return Ok(Some(network.clone()));
        }
        Ok(self.state.read().await.networks.get(&network_id).cloned())
    }

    async fn latest_generation(&mut self, network_id: i64) -> Result<Option<Generation>, DatabaseError> {
        let state = self.state.read().await;
        let committed = state.generations.iter().filter(|g| g.network_id == network_id);
        let latest = committed
            .chain(self.staged_generations(network_id))
            .max_by_key(|g| g.generation)
            .cloned();
        Ok(latest)
    }

    async fn insert_generation(&mut self, generation: Generation) -> Result<(), DatabaseError> {
        let taken = {
            let state = self.state.read().await;
            let taken = state
                .generations
                .iter()
                .chain(self.staged_generations(generation.network_id))
                .any(|g| g.network_id == generation.network_id && g.generation == generation.generation);
            taken
        };
        if taken {
            return Err(DatabaseError::Conflict(format!(
                "generation {} of network {} already exists",
                generation.generation, generation.network_id
            )));
        }
        self.staged.push(StagedWrite::Generation(generation));
        Ok(())
    }

    async fn retire_current(&mut self, network_id: i64) -> Result<u64, DatabaseError> {
        let committed = self
            .state
            .read()
            .await
            .edges
            .iter()
            .filter(|e| e.edge.network_id == network_id && e.edge.is_current)
            .count() as u64;

        let mut staged = 0u64;
        for write in self.staged.iter_mut() {
            if let StagedWrite::Edges(edges) = write {
                for edge in edges.iter_mut().filter(|e| e.edge.network_id == network_id && e.edge.is_current) {
                    edge.edge.is_current = false;
                    staged += 1;
                }
            }
        }

        self.staged.push(StagedWrite::Retire(network_id));
        Ok(committed + staged)
    }

    async fn insert_edges(&mut self, edges: Vec<EdgeRecord>) -> Result<u64, DatabaseError> {
        if self.fail_edge_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("edge insert rejected by store".to_string()));
        }
        let count = edges.len() as u64;
        let versions: Vec<EdgeVersion> = {
            let mut state = self.state.write().await;
            edges
                .into_iter()
                .map(|edge| {
                    state.next_edge_id += 1;
                    EdgeVersion { id: state.next_edge_id, edge }
                })
                .collect()
        };
        self.staged.push(StagedWrite::Edges(versions));
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryUnitOfWork { state, staged, .. } = *self;
        let mut state = state.write().await;

        // Check references before applying anything so a failed commit changes nothing
        let staged_ids: Vec<i64> = staged
            .iter()
            .filter_map(|w| match w {
                StagedWrite::Network(n) => Some(n.id),
                _ => None,
            })
            .collect();
        let missing = staged.iter().find_map(|w| {
            let network_id = match w {
                StagedWrite::Generation(g) => g.network_id,
                StagedWrite::Edges(edges) => edges.first()?.edge.network_id,
                _ => return None,
            };
            (!state.networks.contains_key(&network_id) && !staged_ids.contains(&network_id)).then_some(network_id)
        });
        if let Some(network_id) = missing {
            return Err(DatabaseError::Conflict(format!("network {} no longer exists", network_id)));
        }

        // Another unit of work may have committed the same generation since it was staged
        let duplicate = staged.iter().find_map(|w| match w {
            StagedWrite::Generation(g)
                if state
                    .generations
                    .iter()
                    .any(|c| c.network_id == g.network_id && c.generation == g.generation) =>
            {
                Some(g)
            }
            _ => None,
        });
        if let Some(generation) = duplicate {
            return Err(DatabaseError::Conflict(format!(
                "generation {} of network {} already exists",
                generation.generation, generation.network_id
            )));
        }

        for write in staged {
            match write {
                StagedWrite::Network(network) => {
                    state.networks.insert(network.id, network);
                }
                StagedWrite::Generation(generation) => state.generations.push(generation),
                StagedWrite::Retire(network_id) => {
                    for edge in state.edges.iter_mut().filter(|e| e.edge.network_id == network_id) {
                        edge.edge.is_current = false;
                    }
                }
                StagedWrite::Edges(edges) => state.edges.extend(edges),
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[async_trait]
impl EdgeStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError> {
        Ok(Box::new(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            fail_edge_inserts: Arc::clone(&self.fail_edge_inserts),
            staged: Vec::new(),
        }))
    }

    async fn find_network(&self, network_id: i64) -> Result<Option<Network>, DatabaseError> {
        Ok(self.state.read().await.networks.get(&network_id).cloned())
    }

    async fn list_networks(&self, owner_id: i64) -> Result<Vec<Network>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .networks
            .values()
            .filter(|n| n.user_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_network(&self, network_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.write().await.remove_network(network_id))
    }

    async fn list_generations(&self, network_id: i64) -> Result<Vec<Generation>, DatabaseError> {
        let mut generations: Vec<Generation> = self
            .state
            .read()
            .await
            .generations
            .iter()
            .filter(|g| g.network_id == network_id)
            .cloned()
            .collect();
        generations.sort_by_key(|g| g.generation);
        Ok(generations)
    }

    async fn generation_at(&self, network_id: i64, at: DateTime<Utc>) -> Result<Option<Generation>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .generations
            .iter()
            .filter(|g| g.network_id == network_id && g.started_at <= at)
            .max_by_key(|g| (g.started_at, g.generation))
            .cloned())
    }

    async fn select_edges(&self, network_id: i64, selector: EdgeSelector) -> Result<Vec<EdgeVersion>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| e.edge.network_id == network_id)
            .filter(|e| match selector {
                EdgeSelector::Current => e.edge.is_current,
                EdgeSelector::Generation(generation) => e.edge.generation == generation,
            })
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(DatabaseError::Conflict(format!("username '{}' is already registered", user.username)));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Conflict(format!("email '{}' is already registered", user.email)));
        }

        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: user.username,
            email: user.email,
            hashed_password: user.hashed_password,
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(self.state.read().await.users.values().find(|u| u.email == email).cloned())
    }

    async fn delete_user(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = state
            .networks
            .values()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.id)
            .collect();
        for network_id in owned {
            state.remove_network(network_id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::geometry::Geometry;
    use serde_json::Map;

    fn edge(network_id: i64, generation: i32) -> EdgeRecord {
        EdgeRecord {
            name: None,
            reference: None,
            lanes: None,
            oneway: None,
            length: None,
            width: None,
            tunnel: None,
            extra_properties: Map::new(),
            geometry: Geometry::Point { coordinates: vec![0.0, 0.0] },
            is_current: true,
            timestamp: Utc::now(),
            generation,
            network_id,
            user_id: 1,
        }
    }

    fn new_network() -> NewNetwork {
        NewNetwork { name: "n".to_string(), timestamp: Utc::now(), user_id: 1 }
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let network = uow.insert_network(new_network()).await.unwrap();
        uow.insert_edges(vec![edge(network.id, 0)]).await.unwrap();

        assert!(store.find_network(network.id).await.unwrap().is_none());
        assert_eq!(store.edge_count().await, 0);

        uow.commit().await.unwrap();
        assert!(store.find_network(network.id).await.unwrap().is_some());
        assert_eq!(store.edge_count().await, 1);
    }

    #[tokio::test]
    async fn rollback_discards_everything_but_burns_ids() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let first = uow.insert_network(new_network()).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(store.network_count().await, 0);

        let mut uow = store.begin().await.unwrap();
        let second = uow.insert_network(new_network()).await.unwrap();
        uow.commit().await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn commit_fails_when_network_was_deleted_meanwhile() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let network = uow.insert_network(new_network()).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.insert_edges(vec![edge(network.id, 1)]).await.unwrap();
        store.delete_network(network.id).await.unwrap();

        assert!(matches!(uow.commit().await, Err(DatabaseError::Conflict(_))));
        assert_eq!(store.edge_count().await, 0);
    }

    #[tokio::test]
    async fn overlapping_units_of_work_cannot_both_commit_a_generation() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let network = uow.insert_network(new_network()).await.unwrap();
        uow.insert_generation(Generation { network_id: network.id, generation: 0, started_at: Utc::now(), edge_count: 1 })
            .await
            .unwrap();
        uow.insert_edges(vec![edge(network.id, 0)]).await.unwrap();
        uow.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        for uow in [&mut first, &mut second] {
            let latest = uow.latest_generation(network.id).await.unwrap().unwrap();
            uow.retire_current(network.id).await.unwrap();
            uow.insert_generation(Generation {
                network_id: network.id,
                generation: latest.generation + 1,
                started_at: Utc::now(),
                edge_count: 1,
            })
            .await
            .unwrap();
            uow.insert_edges(vec![edge(network.id, latest.generation + 1)]).await.unwrap();
        }

        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(DatabaseError::Conflict(_))));

        let generations = store.list_generations(network.id).await.unwrap();
        assert_eq!(generations.iter().map(|g| g.generation).collect::<Vec<_>>(), vec![0, 1]);
        let latest = store.select_edges(network.id, EdgeSelector::Generation(1)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(store.edge_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_users_conflict() {
        let store = MemoryStore::new();
        let user = NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            hashed_password: "x".to_string(),
            role: crate::types::Role::User,
        };
        store.create_user(user.clone()).await.unwrap();
        assert!(matches!(store.create_user(user).await, Err(DatabaseError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_networks() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                hashed_password: "x".to_string(),
                role: crate::types::Role::User,
            })
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let network = uow
            .insert_network(NewNetwork { name: "n".to_string(), timestamp: Utc::now(), user_id: user.id })
            .await
            .unwrap();
        uow.insert_edges(vec![edge(network.id, 0)]).await.unwrap();
        uow.commit().await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());
        assert_eq!(store.network_count().await, 0);
        assert_eq!(store.edge_count().await, 0);
    }
}
