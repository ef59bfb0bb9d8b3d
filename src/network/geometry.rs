use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Spatial reference of every stored geometry (WGS 84)
pub const SRID: i32 = 4326;

/// A coordinate tuple: longitude, latitude and an optional elevation
pub type Position = Vec<f64>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("geometry is missing")]
    Missing,

    #[error("invalid geometry: {0}")]
    Invalid(String),
}

/// GeoJSON geometry object (RFC 7946 section 3.1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl Geometry {
    /// Interpret a raw GeoJSON value as a geometry with valid coordinate sequences
    pub fn from_value(value: &Value) -> Result<Self, GeometryError> {
        if value.is_null() {
            return Err(GeometryError::Missing);
        }
        let geometry: Geometry = serde_json::from_value(value.clone())
            .map_err(|e| GeometryError::Invalid(e.to_string()))?;
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point { coordinates } => check_position(coordinates),
            Geometry::MultiPoint { coordinates } => coordinates.iter().try_for_each(|p| check_position(p)),
            Geometry::LineString { coordinates } => check_line(coordinates),
            Geometry::MultiLineString { coordinates } => coordinates.iter().try_for_each(|l| check_line(l)),
            Geometry::Polygon { coordinates } => check_polygon(coordinates),
            Geometry::MultiPolygon { coordinates } => coordinates.iter().try_for_each(|p| check_polygon(p)),
            Geometry::GeometryCollection { geometries } => geometries.iter().try_for_each(Geometry::validate),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}

fn check_position(position: &[f64]) -> Result<(), GeometryError> {
    if !(2..=3).contains(&position.len()) {
        return Err(GeometryError::Invalid(format!(
            "position must have 2 or 3 coordinates, found {}",
            position.len()
        )));
    }
    if position.iter().any(|c| !c.is_finite()) {
        return Err(GeometryError::Invalid("position contains a non-finite coordinate".to_string()));
    }
    Ok(())
}

fn check_line(line: &[Position]) -> Result<(), GeometryError> {
    if line.len() < 2 {
        return Err(GeometryError::Invalid(format!(
            "line needs at least 2 positions, found {}",
            line.len()
        )));
    }
    line.iter().try_for_each(|p| check_position(p))
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), GeometryError> {
    for ring in rings {
        if ring.len() < 4 {
            return Err(GeometryError::Invalid(format!(
                "polygon ring needs at least 4 positions, found {}",
                ring.len()
            )));
        }
        ring.iter().try_for_each(|p| check_position(p))?;
        if ring.first() != ring.last() {
            return Err(GeometryError::Invalid("polygon ring is not closed".to_string()));
        }
    }
    Ok(())
}
