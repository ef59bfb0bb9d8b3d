//! GeoJSON rendering of edge versions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::models::EdgeVersion;
use crate::network::geometry::Geometry;

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<EdgeFeature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeFeature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: i64,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub generation: i32,
    pub timestamp: DateTime<Utc>,
    pub is_current: bool,
}

impl From<EdgeVersion> for EdgeFeature {
    fn from(version: EdgeVersion) -> Self {
        let edge = version.edge;
        let mut properties = Map::new();

        let known = [
            ("name", edge.name.map(Value::String)),
            ("ref", edge.reference.map(Value::String)),
            ("lanes", edge.lanes.map(Value::String)),
            ("oneway", edge.oneway.map(Value::Bool)),
            ("length", edge.length.map(Value::from)),
            ("width", edge.width.map(Value::from)),
            ("tunnel", edge.tunnel.map(Value::String)),
        ];
        for (key, value) in known {
            if let Some(value) = value {
                properties.insert(key.to_string(), value);
            }
        }
        // Extra keys never collide with known ones; ingest filtered them out
        properties.extend(edge.extra_properties);

        EdgeFeature {
            kind: "Feature",
            id: version.id,
            geometry: edge.geometry,
            properties,
            version: VersionInfo {
                generation: edge.generation,
                timestamp: edge.timestamp,
                is_current: edge.is_current,
            },
        }
    }
}

impl FromIterator<EdgeVersion> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = EdgeVersion>>(iter: I) -> Self {
        FeatureCollection {
            kind: "FeatureCollection",
            features: iter.into_iter().map(EdgeFeature::from).collect(),
        }
    }
}
