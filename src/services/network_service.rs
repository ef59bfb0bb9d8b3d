use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::database::models::{Generation, Network};
use crate::database::repository::EdgeStore;
use crate::network::ingest::{parse_description, NetworkDescription};
use crate::network::{FeatureCollection, NetworkError, ReplaceOutcome, TemporalEdgeStore};
use crate::types::Actor;

/// Road network operations on behalf of an authenticated actor.
///
/// A network is visible to its owner and to admins. Invisible networks are
/// reported as missing so their existence is not disclosed.
#[derive(Clone)]
pub struct NetworkService {
    store: Arc<dyn EdgeStore>,
    temporal: TemporalEdgeStore,
    settings: NetworkConfig,
}

impl NetworkService {
    pub fn new(store: Arc<dyn EdgeStore>, settings: NetworkConfig) -> Self {
        let temporal = TemporalEdgeStore::new(Arc::clone(&store));
        Self { store, temporal, settings }
    }

    /// Create a network owned by the actor from an uploaded FeatureCollection
    pub async fn upload(&self, raw: &[u8], actor: &Actor) -> Result<Network, NetworkError> {
        let description = self.parse(raw)?;
        debug!(
            "User {} uploading network '{}' with {} features",
            actor.user_id,
            description.name,
            description.features.len()
        );
        self.temporal.ingest(description, actor.user_id).await
    }

    /// Replace the current edges of a network. Name and timestamp in the file are ignored.
    pub async fn update(&self, network_id: i64, raw: &[u8], actor: &Actor) -> Result<ReplaceOutcome, NetworkError> {
        self.visible(network_id, actor).await?;
        let description = self.parse(raw)?;
        self.temporal.replace_current(network_id, description.features).await
    }

    pub async fn edges(
        &self,
        network_id: i64,
        actor: &Actor,
        at_time: Option<DateTime<Utc>>,
    ) -> Result<FeatureCollection, NetworkError> {
        self.visible(network_id, actor).await?;
        let edges = self.temporal.reconstruct(network_id, at_time).await?;
        Ok(edges.into_iter().collect())
    }

    pub async fn list_for_user(&self, user_id: i64, actor: &Actor) -> Result<Vec<Network>, NetworkError> {
        if !actor.can_access(user_id) {
            return Err(NetworkError::Authorization(format!(
                "user {} cannot list networks of user {}",
                actor.user_id, user_id
            )));
        }
        self.store
            .list_networks(user_id)
            .await
            .map_err(NetworkError::persistence("list"))
    }

    pub async fn generations(&self, network_id: i64, actor: &Actor) -> Result<Vec<Generation>, NetworkError> {
        self.visible(network_id, actor).await?;
        self.temporal.generations(network_id).await
    }

    pub async fn delete(&self, network_id: i64, actor: &Actor) -> Result<(), NetworkError> {
        self.visible(network_id, actor).await?;
        let deleted = self
            .store
            .delete_network(network_id)
            .await
            .map_err(NetworkError::persistence("delete"))?;
        if !deleted {
            return Err(NetworkError::NotFound(network_id));
        }

        info!("Network {} deleted by user {}", network_id, actor.user_id);
        Ok(())
    }

    async fn visible(&self, network_id: i64, actor: &Actor) -> Result<Network, NetworkError> {
        let network = self
            .store
            .find_network(network_id)
            .await
            .map_err(NetworkError::persistence("lookup"))?
            .ok_or(NetworkError::NotFound(network_id))?;

        if !actor.can_access(network.user_id) {
            debug!("Network {} hidden from user {}", network_id, actor.user_id);
            return Err(NetworkError::NotFound(network_id));
        }
        Ok(network)
    }

    fn parse(&self, raw: &[u8]) -> Result<NetworkDescription, NetworkError> {
        let description = parse_description(raw, &self.settings.default_name)?;
        if let Some(limit) = self.settings.max_features_per_upload {
            if description.features.len() > limit {
                return Err(NetworkError::validation(format!(
                    "upload has {} features, the limit is {}",
                    description.features.len(),
                    limit
                )));
            }
        }
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::memory::MemoryStore;
    use crate::types::Role;

    const UPLOAD: &[u8] = br#"{
        "type": "FeatureCollection",
        "name": "Ring road",
        "features": [
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}, "properties": {"name": "north"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[1, 1], [2, 0]]}, "properties": {"name": "east"}}
        ]
    }"#;

    fn service() -> NetworkService {
        NetworkService::new(Arc::new(MemoryStore::new()), AppConfig::development().network)
    }

    #[tokio::test]
    async fn owner_sees_edges_and_strangers_get_not_found() {
        let networks = service();
        let owner = Actor::new(1, Role::User);
        let stranger = Actor::new(2, Role::User);
        let admin = Actor::new(3, Role::Admin);

        let network = networks.upload(UPLOAD, &owner).await.unwrap();
        assert_eq!(network.name, "Ring road");

        assert_eq!(networks.edges(network.id, &owner, None).await.unwrap().features.len(), 2);
        assert_eq!(networks.edges(network.id, &admin, None).await.unwrap().features.len(), 2);
        assert!(matches!(
            networks.edges(network.id, &stranger, None).await,
            Err(NetworkError::NotFound(_))
        ));
        assert!(matches!(
            networks.update(network.id, UPLOAD, &stranger).await,
            Err(NetworkError::NotFound(_))
        ));
        assert!(matches!(networks.delete(network.id, &stranger).await, Err(NetworkError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_another_users_networks_is_forbidden() {
        let networks = service();
        let owner = Actor::new(1, Role::User);
        networks.upload(UPLOAD, &owner).await.unwrap();

        assert_eq!(networks.list_for_user(1, &owner).await.unwrap().len(), 1);
        assert_eq!(networks.list_for_user(1, &Actor::new(9, Role::Admin)).await.unwrap().len(), 1);
        assert!(matches!(
            networks.list_for_user(1, &Actor::new(2, Role::User)).await,
            Err(NetworkError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn update_and_history() {
        let networks = service();
        let owner = Actor::new(1, Role::User);
        let network = networks.upload(UPLOAD, &owner).await.unwrap();

        let outcome = networks
            .update(network.id, br#"{"type": "FeatureCollection", "features": []}"#, &owner)
            .await
            .unwrap();
        assert_eq!((outcome.retired, outcome.inserted), (2, 0));

        let history = networks.generations(network.id, &owner).await.unwrap();
        assert_eq!(history.iter().map(|g| g.edge_count).collect::<Vec<_>>(), vec![2, 0]);

        networks.delete(network.id, &owner).await.unwrap();
        assert!(matches!(networks.generations(network.id, &owner).await, Err(NetworkError::NotFound(_))));
    }

    #[tokio::test]
    async fn feature_limit_is_enforced() {
        let mut settings = AppConfig::development().network;
        settings.max_features_per_upload = Some(1);
        let networks = NetworkService::new(Arc::new(MemoryStore::new()), settings);

        assert!(matches!(
            networks.upload(UPLOAD, &Actor::new(1, Role::User)).await,
            Err(NetworkError::Validation { .. })
        ));
    }
}
