use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::network::geometry::Geometry;

/// A normalized edge, ready to be appended to the edge log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub name: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub lanes: Option<String>,
    pub oneway: Option<bool>,
    pub length: Option<f64>,
    pub width: Option<Vec<f64>>,
    pub tunnel: Option<String>,
    /// Attributes outside the known set, kept verbatim
    pub extra_properties: Map<String, Value>,
    pub geometry: Geometry,
    pub is_current: bool,
    pub timestamp: DateTime<Utc>,
    pub generation: i32,
    pub network_id: i64,
    pub user_id: i64,
}

/// A persisted edge version. Only `is_current` ever changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeVersion {
    pub id: i64,
    #[serde(flatten)]
    pub edge: EdgeRecord,
}
