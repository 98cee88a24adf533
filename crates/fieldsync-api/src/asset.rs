//! Asset records exchanged between the local cache and the remote authority.
//!
//! Assets travel as GeoJSON `Feature` objects. Coordinates are always held as
//! (longitude, latitude); swapping to (latitude, longitude) happens at the
//! rendering boundary and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Open property bag attached to every asset (name, status, voltage, ...)
pub type Properties = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssetError {
    #[error("Coordinate out of range: lng={lng}, lat={lat}")]
    InvalidCoordinate { lng: f64, lat: f64 },

    #[error("Position must have 2 or 3 components, got {0}")]
    MalformedPosition(usize),

    #[error("LineString needs at least two positions, got {0}")]
    TooFewPositions(usize),

    #[error("Feature has no id")]
    MissingId,

    #[error("Expected a GeoJSON Feature, got type '{0}'")]
    NotAFeature(String),

    #[error("Invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },
}

/// Stable asset identifier.
///
/// The remote may hand out integer or string ids. Two ids are the same asset
/// when their canonical text form (`key()`) matches, so `Int(7)` and
/// `Text("7")` address the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetId {
    Int(i64),
    Text(String),
}

impl AssetId {
    /// Canonical text form used as the storage key
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Parse a user-supplied id, preferring the integer form
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(AssetId::Int)
            .unwrap_or_else(|_| AssetId::Text(raw.to_string()))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Int(i) => write!(f, "{}", i),
            AssetId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl PartialEq for AssetId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AssetId::Int(a), AssetId::Int(b)) => a == b,
            (AssetId::Text(a), AssetId::Text(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

impl Eq for AssetId {}

impl std::hash::Hash for AssetId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<i64> for AssetId {
    fn from(value: i64) -> Self {
        AssetId::Int(value)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        AssetId::Text(value.to_string())
    }
}

/// A single (longitude, latitude) pair, serialized as a GeoJSON position.
///
/// An optional third (altitude) component is accepted on input and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        let in_range = self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat);
        if in_range {
            Ok(())
        } else {
            Err(AssetError::InvalidCoordinate {
                lng: self.lng,
                lat: self.lat,
            })
        }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = AssetError;

    fn try_from(raw: Vec<f64>) -> Result<Self, Self::Error> {
        match raw.as_slice() {
            [lng, lat] | [lng, lat, _] => Ok(Position::new(*lng, *lat)),
            other => Err(AssetError::MalformedPosition(other.len())),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lng, p.lat]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
        }
    }

    pub fn positions(&self) -> Vec<Position> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::LineString(ps) => ps.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        match self {
            Geometry::Point(p) => p.validate(),
            Geometry::LineString(ps) => {
                if ps.len() < 2 {
                    return Err(AssetError::TooFewPositions(ps.len()));
                }
                ps.iter().try_for_each(Position::validate)
            }
        }
    }
}

/// The unit of synchronization.
///
/// `pending_sync` is local bookkeeping: it is never written to or read from the
/// wire, so every deserialized asset starts out as synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Feature", into = "Feature")]
pub struct Asset {
    pub id: AssetId,
    pub geometry: Geometry,
    pub properties: Properties,
    pub pending_sync: bool,
}

impl Asset {
    /// A locally captured asset that the remote has not acknowledged yet
    pub fn pending(id: AssetId, geometry: Geometry, properties: Properties) -> Self {
        Self {
            id,
            geometry,
            properties,
            pending_sync: true,
        }
    }

    pub fn synced(id: AssetId, geometry: Geometry, properties: Properties) -> Self {
        Self {
            id,
            geometry,
            properties,
            pending_sync: false,
        }
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.property_str("name")
    }

    pub fn status(&self) -> Option<&str> {
        self.property_str("status")
    }

    /// Presence and format checks. Property contents are otherwise opaque.
    pub fn validate(&self) -> Result<(), AssetError> {
        self.geometry.validate()?;
        for key in ["name", "status", "type"] {
            match self.properties.get(key) {
                None | Some(serde_json::Value::String(_)) => {}
                Some(other) => {
                    return Err(AssetError::InvalidProperty {
                        key: key.to_string(),
                        reason: format!("expected a string, got {}", other),
                    });
                }
            }
        }
        Ok(())
    }
}

/// GeoJSON Feature as it appears on the wire
#[derive(Serialize, Deserialize)]
struct Feature {
    #[serde(rename = "type", default = "feature_tag")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<AssetId>,
    geometry: Geometry,
    #[serde(default)]
    properties: Option<Properties>,
}

fn feature_tag() -> String {
    "Feature".to_string()
}

impl TryFrom<Feature> for Asset {
    type Error = AssetError;

    fn try_from(feature: Feature) -> Result<Self, Self::Error> {
        if feature.kind != "Feature" {
            return Err(AssetError::NotAFeature(feature.kind));
        }
        let properties = feature.properties.unwrap_or_default();
        // Some exports keep the id inside the property bag only
        let id = match feature.id {
            Some(id) => id,
            None => match properties.get("id") {
                Some(serde_json::Value::Number(n)) => {
                    n.as_i64().map(AssetId::Int).ok_or(AssetError::MissingId)?
                }
                Some(serde_json::Value::String(s)) => AssetId::Text(s.clone()),
                _ => return Err(AssetError::MissingId),
            },
        };
        Ok(Asset::synced(id, feature.geometry, properties))
    }
}

impl From<Asset> for Feature {
    fn from(asset: Asset) -> Self {
        Feature {
            kind: feature_tag(),
            id: Some(asset.id),
            geometry: asset.geometry,
            properties: Some(asset.properties),
        }
    }
}
