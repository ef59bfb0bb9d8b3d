//! Temporal edge store: versioned edge log on top of an [`EdgeStore`].
//!
//! Every write happens inside one unit of work. Replacing a network's edges
//! retires the current rows and appends a new generation; nothing is ever
//! deleted, so any past state can be reconstructed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::models::{EdgeVersion, Generation, Network, NewNetwork};
use crate::database::repository::{EdgeSelector, EdgeStore, UnitOfWork};
use crate::network::error::NetworkError;
use crate::network::ingest::{self, truncate_micros, Feature, GenerationStamp, NetworkDescription, FIRST_GENERATION};

/// Summary of one `replace_current` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaceOutcome {
    pub network_id: i64,
    pub generation: i32,
    pub timestamp: DateTime<Utc>,
    pub retired: u64,
    pub inserted: u64,
}

#[derive(Clone)]
pub struct TemporalEdgeStore {
    store: Arc<dyn EdgeStore>,
}

impl TemporalEdgeStore {
    pub fn new(store: Arc<dyn EdgeStore>) -> Self {
        Self { store }
    }

    /// Create a network and its first generation of edges.
    ///
    /// The description timestamp (or now) becomes both the network timestamp
    /// and the version timestamp of every edge. Timestamps in the future are refused.
    pub async fn ingest(&self, description: NetworkDescription, owner_id: i64) -> Result<Network, NetworkError> {
        let now = Utc::now();
        let timestamp = truncate_micros(description.timestamp.unwrap_or(now));
        if timestamp > now {
            return Err(NetworkError::validation(format!(
                "network timestamp {} is in the future",
                timestamp.to_rfc3339()
            )));
        }

        let mut uow = self.store.begin().await.map_err(NetworkError::persistence("ingest"))?;
        let result = ingest_in(uow.as_mut(), description, owner_id, timestamp).await;
        let network = finish(uow, result, "ingest").await?;

        info!("Ingested network {} '{}' for user {}", network.id, network.name, owner_id);
        Ok(network)
    }

    /// Retire the current edges of a network and append `features` as the next generation.
    ///
    /// All-or-nothing: any failure rolls back, leaving the previous current set intact.
    pub async fn replace_current(&self, network_id: i64, features: Vec<Feature>) -> Result<ReplaceOutcome, NetworkError> {
        let mut uow = self.store.begin().await.map_err(NetworkError::persistence("update"))?;
        let result = replace_in(uow.as_mut(), network_id, &features).await;
        let outcome = finish(uow, result, "update").await?;

        info!(
            "Network {} advanced to generation {}: {} edges retired, {} inserted",
            outcome.network_id, outcome.generation, outcome.retired, outcome.inserted
        );
        Ok(outcome)
    }

    /// The edges as they were at `at_time`, or the current edges when `None`.
    ///
    /// A time before the first generation yields an empty set.
    pub async fn reconstruct(
        &self,
        network_id: i64,
        at_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<EdgeVersion>, NetworkError> {
        self.store
            .find_network(network_id)
            .await
            .map_err(NetworkError::persistence("reconstruct"))?
            .ok_or(NetworkError::NotFound(network_id))?;

        let selector = match at_time {
            None => EdgeSelector::Current,
            Some(at) => {
                let active = self
                    .store
                    .generation_at(network_id, at)
                    .await
                    .map_err(NetworkError::persistence("reconstruct"))?;
                match active {
                    Some(generation) => EdgeSelector::Generation(generation.generation),
                    None => {
                        debug!("Network {} has no generation at {}", network_id, at.to_rfc3339());
                        return Ok(Vec::new());
                    }
                }
            }
        };

        self.store
            .select_edges(network_id, selector)
            .await
            .map_err(NetworkError::persistence("reconstruct"))
    }

    /// Every generation of a network, oldest first
    pub async fn generations(&self, network_id: i64) -> Result<Vec<Generation>, NetworkError> {
        self.store
            .find_network(network_id)
            .await
            .map_err(NetworkError::persistence("history"))?
            .ok_or(NetworkError::NotFound(network_id))?;

        self.store
            .list_generations(network_id)
            .await
            .map_err(NetworkError::persistence("history"))
    }
}

async fn ingest_in(
    uow: &mut dyn UnitOfWork,
    description: NetworkDescription,
    owner_id: i64,
    timestamp: DateTime<Utc>,
) -> Result<Network, NetworkError> {
    let network = uow
        .insert_network(NewNetwork { name: description.name, timestamp, user_id: owner_id })
        .await
        .map_err(NetworkError::persistence("ingest"))?;

    let stamp = GenerationStamp::new(FIRST_GENERATION, timestamp);
    let edges = ingest::normalize_batch(&description.features, network.id, owner_id, stamp)?;

    uow.insert_generation(Generation {
        network_id: network.id,
        generation: stamp.generation,
        started_at: stamp.timestamp,
        edge_count: edges.len() as i64,
    })
    .await
    .map_err(NetworkError::persistence("ingest"))?;

    uow.insert_edges(edges).await.map_err(NetworkError::persistence("ingest"))?;
    Ok(network)
}

async fn replace_in(
    uow: &mut dyn UnitOfWork,
    network_id: i64,
    features: &[Feature],
) -> Result<ReplaceOutcome, NetworkError> {
    let network = uow
        .lock_network(network_id)
        .await
        .map_err(NetworkError::persistence("update"))?
        .ok_or(NetworkError::NotFound(network_id))?;

    let previous = uow
        .latest_generation(network_id)
        .await
        .map_err(NetworkError::persistence("update"))?;
    let stamp = next_generation(previous.as_ref(), Utc::now());

    // Normalize before touching the log so a bad feature costs no writes
    let edges = ingest::normalize_batch(features, network_id, network.user_id, stamp)?;

    let retired = uow
        .retire_current(network_id)
        .await
        .map_err(NetworkError::persistence("update"))?;

    uow.insert_generation(Generation {
        network_id,
        generation: stamp.generation,
        started_at: stamp.timestamp,
        edge_count: edges.len() as i64,
    })
    .await
    .map_err(NetworkError::persistence("update"))?;

    let inserted = uow.insert_edges(edges).await.map_err(NetworkError::persistence("update"))?;

    Ok(ReplaceOutcome {
        network_id,
        generation: stamp.generation,
        timestamp: stamp.timestamp,
        retired,
        inserted,
    })
}

/// Next generation number and start time. Start times strictly increase per network.
pub(crate) fn next_generation(previous: Option<&Generation>, now: DateTime<Utc>) -> GenerationStamp {
    let now = truncate_micros(now);
    match previous {
        None => GenerationStamp::new(FIRST_GENERATION, now),
        Some(previous) => {
            let floor = previous.started_at + Duration::microseconds(1);
            if now < floor {
                warn!(
                    "Clock for network {} is behind generation {}; stamping {}",
                    previous.network_id,
                    previous.generation,
                    floor.to_rfc3339()
                );
            }
            GenerationStamp::new(previous.generation + 1, now.max(floor))
        }
    }
}

async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, NetworkError>,
    operation: &'static str,
) -> Result<T, NetworkError> {
    match result {
        Ok(value) => {
            uow.commit().await.map_err(NetworkError::persistence(operation))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                error!("Rollback after failed {} also failed: {}", operation, rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use serde_json::json;

    fn road(name: &str) -> Feature {
        serde_json::from_value(json!({
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
            "properties": {"name": name}
        }))
        .unwrap()
    }

    fn description(names: &[&str], timestamp: Option<DateTime<Utc>>) -> NetworkDescription {
        NetworkDescription {
            name: "test network".to_string(),
            timestamp,
            features: names.iter().map(|n| road(n)).collect(),
        }
    }

    fn names(edges: &[EdgeVersion]) -> Vec<String> {
        let mut names: Vec<String> = edges.iter().filter_map(|e| e.edge.name.clone()).collect();
        names.sort();
        names
    }

    fn setup() -> (MemoryStore, TemporalEdgeStore) {
        let memory = MemoryStore::new();
        let temporal = TemporalEdgeStore::new(Arc::new(memory.clone()));
        (memory, temporal)
    }

    #[tokio::test]
    async fn ingest_stamps_every_edge_with_the_network_timestamp() {
        let (_, temporal) = setup();
        let t0 = Utc::now() - Duration::hours(1);
        let network = temporal.ingest(description(&["a", "b"], Some(t0)), 42).await.unwrap();

        assert_eq!(network.timestamp, truncate_micros(t0));
        assert_eq!(network.user_id, 42);

        let current = temporal.reconstruct(network.id, None).await.unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|e| e.edge.is_current));
        assert!(current.iter().all(|e| e.edge.timestamp == network.timestamp));
        assert!(current.iter().all(|e| e.edge.generation == FIRST_GENERATION));
    }

    #[tokio::test]
    async fn ingest_rejects_future_timestamps() {
        let (memory, temporal) = setup();
        let future = Utc::now() + Duration::days(1);
        let err = temporal.ingest(description(&["a"], Some(future)), 1).await.unwrap_err();
        assert!(matches!(err, NetworkError::Validation { .. }));
        assert_eq!(memory.network_count().await, 0);
    }

    #[tokio::test]
    async fn ingest_with_bad_geometry_writes_nothing() {
        let (memory, temporal) = setup();
        let mut desc = description(&["a"], None);
        desc.features.push(Feature { geometry: json!(null), properties: None });

        let err = temporal.ingest(desc, 1).await.unwrap_err();
        assert!(matches!(err, NetworkError::Validation { feature: Some(1), .. }));
        assert_eq!(memory.network_count().await, 0);
        assert_eq!(memory.edge_count().await, 0);
    }

    #[tokio::test]
    async fn replace_retires_previous_and_appends_new() {
        let (memory, temporal) = setup();
        let network = temporal.ingest(description(&["a", "b"], None), 1).await.unwrap();

        let outcome = temporal
            .replace_current(network.id, vec![road("c"), road("d"), road("e")])
            .await
            .unwrap();
        assert_eq!(outcome.generation, 1);
        assert_eq!(outcome.retired, 2);
        assert_eq!(outcome.inserted, 3);

        let current = temporal.reconstruct(network.id, None).await.unwrap();
        assert_eq!(names(&current), vec!["c", "d", "e"]);
        assert!(current.iter().all(|e| e.edge.timestamp == outcome.timestamp));

        // Nothing is deleted
        assert_eq!(memory.edge_count().await, 5);
    }

    #[tokio::test]
    async fn reconstruct_returns_the_generation_active_at_a_time() {
        let (_, temporal) = setup();
        let t0 = Utc::now() - Duration::hours(2);
        let network = temporal.ingest(description(&["a", "b"], Some(t0)), 1).await.unwrap();
        let first = temporal.replace_current(network.id, vec![road("c")]).await.unwrap();
        let second = temporal.replace_current(network.id, vec![road("d"), road("e")]).await.unwrap();

        let at_t0 = temporal.reconstruct(network.id, Some(t0)).await.unwrap();
        assert_eq!(names(&at_t0), vec!["a", "b"]);
        assert!(at_t0.iter().all(|e| !e.edge.is_current));

        let between = temporal
            .reconstruct(network.id, Some(t0 + Duration::minutes(30)))
            .await
            .unwrap();
        assert_eq!(names(&between), vec!["a", "b"]);

        let at_first = temporal.reconstruct(network.id, Some(first.timestamp)).await.unwrap();
        assert_eq!(names(&at_first), vec!["c"]);

        let at_second = temporal.reconstruct(network.id, Some(second.timestamp)).await.unwrap();
        assert_eq!(names(&at_second), vec!["d", "e"]);

        let before = temporal
            .reconstruct(network.id, Some(t0 - Duration::seconds(1)))
            .await
            .unwrap();
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn empty_replacement_is_a_real_generation() {
        let (_, temporal) = setup();
        let network = temporal.ingest(description(&["a"], None), 1).await.unwrap();
        let outcome = temporal.replace_current(network.id, Vec::new()).await.unwrap();

        assert_eq!(outcome.inserted, 0);
        assert!(temporal.reconstruct(network.id, None).await.unwrap().is_empty());
        assert!(temporal
            .reconstruct(network.id, Some(outcome.timestamp))
            .await
            .unwrap()
            .is_empty());

        let history = temporal.generations(network.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].edge_count, 0);
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_whole_update() {
        let (memory, temporal) = setup();
        let network = temporal.ingest(description(&["a", "b"], None), 1).await.unwrap();

        memory.fail_edge_inserts(true);
        let err = temporal.replace_current(network.id, vec![road("c")]).await.unwrap_err();
        assert!(matches!(err, NetworkError::Persistence { operation: "update", .. }));
        memory.fail_edge_inserts(false);

        let current = temporal.reconstruct(network.id, None).await.unwrap();
        assert_eq!(names(&current), vec!["a", "b"]);
        assert!(current.iter().all(|e| e.edge.is_current));
        assert_eq!(temporal.generations(network.id).await.unwrap().len(), 1);
        assert_eq!(memory.edge_count().await, 2);
    }

    #[tokio::test]
    async fn interleaved_replaces_yield_one_batch_per_generation() {
        let (memory, temporal) = setup();
        let network = temporal.ingest(description(&["a"], None), 1).await.unwrap();

        let mut first = memory.begin().await.unwrap();
        let mut second = memory.begin().await.unwrap();
        let first_result = replace_in(first.as_mut(), network.id, &[road("b")]).await;
        let second_result = replace_in(second.as_mut(), network.id, &[road("c")]).await;

        let winner = finish(first, first_result, "update").await.unwrap();
        let err = finish(second, second_result, "update").await.unwrap_err();
        assert!(matches!(err, NetworkError::Persistence { operation: "update", .. }));

        let history = temporal.generations(network.id).await.unwrap();
        assert_eq!(history.iter().map(|g| g.generation).collect::<Vec<_>>(), vec![0, 1]);

        let at_latest = temporal.reconstruct(network.id, Some(winner.timestamp)).await.unwrap();
        assert_eq!(names(&at_latest), vec!["b"]);
        assert_eq!(names(&temporal.reconstruct(network.id, None).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn invalid_feature_leaves_current_set_untouched() {
        let (_, temporal) = setup();
        let network = temporal.ingest(description(&["a"], None), 1).await.unwrap();
        let broken = Feature { geometry: json!({"type": "LineString", "coordinates": [[0, 0]]}), properties: None };

        let err = temporal.replace_current(network.id, vec![road("b"), broken]).await.unwrap_err();
        assert!(matches!(err, NetworkError::Validation { feature: Some(1), .. }));
        assert_eq!(names(&temporal.reconstruct(network.id, None).await.unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn unknown_network_is_not_found() {
        let (_, temporal) = setup();
        assert!(matches!(
            temporal.replace_current(99, vec![road("a")]).await,
            Err(NetworkError::NotFound(99))
        ));
        assert!(matches!(temporal.reconstruct(99, None).await, Err(NetworkError::NotFound(99))));
        assert!(matches!(temporal.generations(99).await, Err(NetworkError::NotFound(99))));
    }

    #[tokio::test]
    async fn edges_belong_to_the_network_owner() {
        let (_, temporal) = setup();
        let network = temporal.ingest(description(&["a"], None), 7).await.unwrap();
        temporal.replace_current(network.id, vec![road("b")]).await.unwrap();
        let current = temporal.reconstruct(network.id, None).await.unwrap();
        assert!(current.iter().all(|e| e.edge.user_id == 7 && e.edge.network_id == network.id));
    }

    #[test]
    fn generation_start_times_strictly_increase() {
        let started_at = Utc::now();
        let previous = Generation { network_id: 1, generation: 3, started_at, edge_count: 0 };

        let behind = next_generation(Some(&previous), started_at - Duration::seconds(5));
        assert_eq!(behind.generation, 4);
        assert!(behind.timestamp > started_at);

        let ahead = started_at + Duration::seconds(5);
        assert_eq!(next_generation(Some(&previous), ahead).timestamp, truncate_micros(ahead));
        assert_eq!(next_generation(None, ahead).generation, FIRST_GENERATION);
    }
}
