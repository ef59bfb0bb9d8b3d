//! Edge ingestor: turns a GeoJSON FeatureCollection into normalized edge records.

use chrono::{DateTime, DurationRound, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::database::models::EdgeRecord;
use crate::network::error::NetworkError;
use crate::network::geometry::Geometry;

/// Attribute keys extracted into typed columns. Everything else lands in `extra_properties`.
pub const KNOWN_FIELDS: [&str; 7] = ["name", "ref", "oneway", "length", "tunnel", "lanes", "width"];

/// Generation number of the edges written by the initial upload
pub const FIRST_GENERATION: i32 = 0;

/// A parsed upload: network name, optional reference time and raw features
#[derive(Debug, Clone)]
pub struct NetworkDescription {
    pub name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub features: Vec<Feature>,
}

/// One GeoJSON feature; geometry is validated during normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Generation number and version timestamp shared by every edge of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationStamp {
    pub generation: i32,
    pub timestamp: DateTime<Utc>,
}

impl GenerationStamp {
    pub fn new(generation: i32, timestamp: DateTime<Utc>) -> Self {
        Self { generation, timestamp: truncate_micros(timestamp) }
    }
}

/// Storage keeps microseconds; truncate so stamps compare equal after a round trip
pub fn truncate_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(chrono::Duration::microseconds(1))
        .unwrap_or(timestamp)
}

/// Parse an uploaded network description.
///
/// Accepts a JSON object that is either untyped or a `FeatureCollection`.
/// `features` defaults to empty and `name` to `default_name`.
pub fn parse_description(raw: &[u8], default_name: &str) -> Result<NetworkDescription, NetworkError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| NetworkError::validation(format!("network description is not valid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| NetworkError::validation("network description must be a JSON object"))?;

    match object.get("type") {
        None | Some(Value::Null) => {}
        Some(Value::String(kind)) if kind == "FeatureCollection" => {}
        Some(other) => {
            return Err(NetworkError::validation(format!(
                "expected a FeatureCollection, found type {}",
                other
            )))
        }
    }

    let name = match object.get("name") {
        None | Some(Value::Null) => default_name.to_string(),
        Some(Value::String(name)) if name.trim().is_empty() => default_name.to_string(),
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(NetworkError::validation("network name must be a string")),
    };

    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(
            parse_timestamp(text)
                .ok_or_else(|| NetworkError::validation(format!("invalid network timestamp '{}'", text)))?,
        ),
        Some(_) => return Err(NetworkError::validation("network timestamp must be a string")),
    };

    let features = match object.get("features") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<Feature>(item.clone())
                    .map_err(|e| NetworkError::validation(format!("malformed feature: {}", e)).at_feature(index))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(NetworkError::validation("features must be an array")),
    };

    Ok(NetworkDescription { name, timestamp, features })
}

/// RFC 3339, or a naive ISO 8601 date/datetime read as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Lanes arrive as a count or a list of counts; stored as one canonical string
pub fn normalize_lanes(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().map(text_of).collect::<Vec<_>>().join(",")),
        other => Some(text_of(other)),
    }
}

/// Width arrives as a scalar or a list. Any unparseable element voids the whole field.
pub fn normalize_width(value: Option<&Value>) -> Option<Vec<f64>> {
    match value? {
        Value::Null => None,
        Value::Array(items) => items.iter().map(parse_float).collect(),
        other => parse_float(other).map(|width| vec![width]),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn text_field(properties: &Map<String, Value>, key: &str) -> Result<Option<String>, NetworkError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(value.to_string())),
        Some(_) => Err(NetworkError::validation(format!("'{}' must be a scalar value", key))),
    }
}

fn oneway_field(properties: &Map<String, Value>) -> Result<Option<bool>, NetworkError> {
    let invalid = |shown: &Value| NetworkError::validation(format!("'oneway' is not a boolean: {}", shown));
    match properties.get("oneway") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(value @ Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid(value)),
        },
        // Same literals PostgreSQL accepts for boolean input
        Some(value @ Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Some(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(Some(false)),
            _ => Err(invalid(value)),
        },
        Some(value) => Err(invalid(value)),
    }
}

fn length_field(properties: &Map<String, Value>) -> Result<Option<f64>, NetworkError> {
    match properties.get("length") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_float(value)
            .map(Some)
            .ok_or_else(|| NetworkError::validation(format!("'length' is not a number: {}", value))),
    }
}

/// Normalize one feature into an edge record flagged current.
pub fn normalize(
    feature: &Feature,
    network_id: i64,
    owner_id: i64,
    stamp: GenerationStamp,
) -> Result<EdgeRecord, NetworkError> {
    let geometry = Geometry::from_value(&feature.geometry)?;
    let empty = Map::new();
    let properties = feature.properties.as_ref().unwrap_or(&empty);

    let extra_properties: Map<String, Value> = properties
        .iter()
        .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(EdgeRecord {
        name: text_field(properties, "name")?,
        reference: text_field(properties, "ref")?,
        lanes: normalize_lanes(properties.get("lanes")),
        oneway: oneway_field(properties)?,
        length: length_field(properties)?,
        width: normalize_width(properties.get("width")),
        tunnel: text_field(properties, "tunnel")?,
        extra_properties,
        geometry,
        is_current: true,
        timestamp: stamp.timestamp,
        generation: stamp.generation,
        network_id,
        user_id: owner_id,
    })
}

/// Normalize a whole batch; the first failing feature fails the batch
pub fn normalize_batch(
    features: &[Feature],
    network_id: i64,
    owner_id: i64,
    stamp: GenerationStamp,
) -> Result<Vec<EdgeRecord>, NetworkError> {
    features
        .iter()
        .enumerate()
        .map(|(index, feature)| normalize(feature, network_id, owner_id, stamp).map_err(|e| e.at_feature(index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(properties: Value) -> Feature {
        serde_json::from_value(json!({
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": [[-1.08, 53.96], [-1.07, 53.95]]},
            "properties": properties
        }))
        .unwrap()
    }

    fn stamp() -> GenerationStamp {
        GenerationStamp::new(FIRST_GENERATION, Utc::now())
    }

    #[test]
    fn width_scalar_becomes_single_element_list() {
        assert_eq!(normalize_width(Some(&json!(3))), Some(vec![3.0]));
        assert_eq!(normalize_width(Some(&json!(2.5))), Some(vec![2.5]));
        assert_eq!(normalize_width(Some(&json!("4.5"))), Some(vec![4.5]));
    }

    #[test]
    fn width_list_parses_element_wise() {
        assert_eq!(normalize_width(Some(&json!([3, "2.5", 1.25]))), Some(vec![3.0, 2.5, 1.25]));
        assert_eq!(normalize_width(Some(&json!([]))), Some(vec![]));
    }

    #[test]
    fn width_with_one_bad_element_yields_nothing() {
        assert_eq!(normalize_width(Some(&json!([3, "wide", 2]))), None);
        assert_eq!(normalize_width(Some(&json!([3, null]))), None);
    }

    #[test]
    fn width_missing_or_unparseable_yields_nothing() {
        assert_eq!(normalize_width(None), None);
        assert_eq!(normalize_width(Some(&Value::Null)), None);
        assert_eq!(normalize_width(Some(&json!("3 m"))), None);
        assert_eq!(normalize_width(Some(&json!({"value": 3}))), None);
    }

    #[test]
    fn lanes_are_canonicalized() {
        assert_eq!(normalize_lanes(Some(&json!([1, 2, 3]))), Some("1,2,3".to_string()));
        assert_eq!(normalize_lanes(Some(&json!(2))), Some("2".to_string()));
        assert_eq!(normalize_lanes(Some(&json!("2;3"))), Some("2;3".to_string()));
        assert_eq!(normalize_lanes(Some(&json!(["1", 2]))), Some("1,2".to_string()));
        assert_eq!(normalize_lanes(None), None);
        assert_eq!(normalize_lanes(Some(&Value::Null)), None);
    }

    #[test]
    fn known_fields_are_typed_and_unknown_ones_preserved() {
        let edge = normalize(
            &feature(json!({
                "name": "Ouse Bridge",
                "ref": 59,
                "oneway": "yes",
                "length": "120.5",
                "tunnel": "no",
                "lanes": [1, 2],
                "width": 7,
                "highway": "primary",
                "surface": {"kind": "asphalt", "grade": 2}
            })),
            7,
            11,
            stamp(),
        )
        .unwrap();

        assert_eq!(edge.name.as_deref(), Some("Ouse Bridge"));
        assert_eq!(edge.reference.as_deref(), Some("59"));
        assert_eq!(edge.oneway, Some(true));
        assert_eq!(edge.length, Some(120.5));
        assert_eq!(edge.tunnel.as_deref(), Some("no"));
        assert_eq!(edge.lanes.as_deref(), Some("1,2"));
        assert_eq!(edge.width, Some(vec![7.0]));
        assert!(edge.is_current);
        assert_eq!((edge.network_id, edge.user_id), (7, 11));

        assert_eq!(edge.extra_properties.len(), 2);
        assert_eq!(edge.extra_properties["highway"], json!("primary"));
        assert_eq!(edge.extra_properties["surface"], json!({"kind": "asphalt", "grade": 2}));
    }

    #[test]
    fn missing_properties_are_an_empty_bag() {
        let feature: Feature = serde_json::from_value(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0, 0]},
            "properties": null
        }))
        .unwrap();
        let edge = normalize(&feature, 1, 1, stamp()).unwrap();
        assert!(edge.extra_properties.is_empty());
        assert_eq!(edge.name, None);
    }

    #[test]
    fn bad_known_field_shapes_are_rejected() {
        assert!(normalize(&feature(json!({"oneway": "-1"})), 1, 1, stamp()).is_err());
        assert!(normalize(&feature(json!({"length": "long"})), 1, 1, stamp()).is_err());
        assert!(normalize(&feature(json!({"name": ["a", "b"]})), 1, 1, stamp()).is_err());
    }

    #[test]
    fn batch_shares_one_stamp_and_reports_failing_index() {
        let good = feature(json!({"name": "a"}));
        let stamp = stamp();
        let edges = normalize_batch(&[good.clone(), good.clone()], 1, 1, stamp).unwrap();
        assert!(edges.iter().all(|e| e.timestamp == stamp.timestamp && e.generation == stamp.generation));

        let broken = Feature { geometry: json!({"type": "LineString", "coordinates": 5}), properties: None };
        match normalize_batch(&[good.clone(), good, broken], 1, 1, stamp) {
            Err(NetworkError::Validation { feature, .. }) => assert_eq!(feature, Some(2)),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn parses_feature_collection() {
        let raw = br#"{
            "type": "FeatureCollection",
            "name": "York cycle network",
            "timestamp": "2024-05-01T12:00:00Z",
            "features": [{"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}, "properties": {}}]
        }"#;
        let description = parse_description(raw, "Unnamed Network").unwrap();
        assert_eq!(description.name, "York cycle network");
        assert_eq!(description.timestamp, parse_timestamp("2024-05-01T12:00:00Z"));
        assert_eq!(description.features.len(), 1);
    }

    #[test]
    fn description_defaults() {
        let description = parse_description(br#"{"name": ""}"#, "Unnamed Network").unwrap();
        assert_eq!(description.name, "Unnamed Network");
        assert!(description.timestamp.is_none());
        assert!(description.features.is_empty());
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert!(parse_description(b"not json", "n").is_err());
        assert!(parse_description(b"[1, 2]", "n").is_err());
        assert!(parse_description(br#"{"type": "Feature"}"#, "n").is_err());
        assert!(parse_description(br#"{"features": {}}"#, "n").is_err());
        assert!(parse_description(br#"{"timestamp": "yesterday"}"#, "n").is_err());
        assert!(parse_description(br#"{"features": [42]}"#, "n").is_err());
    }

    #[test]
    fn timestamps_accept_naive_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("soon"), None);
    }
}
