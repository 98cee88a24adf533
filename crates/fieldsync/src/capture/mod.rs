//! Local edit actions that synthesize pending assets
//!
//! Every captured asset starts with `pending_sync` set and carries the
//! `as-built` status, which is what the rendering boundary keys its role on.

pub mod line_tool;

pub use line_tool::{CableEndpoints, LineSelection, LineTool, LineToolState};

use chrono::{DateTime, Utc};
use fieldsync_api::{Asset, AssetError, AssetId, Geometry, Position, Properties};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::storage::StorageError;

pub const AS_BUILT_STATUS: &str = "as-built";

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The edit could not be persisted and must not be treated as saved
    #[error("Failed to persist captured asset: {0}")]
    Storage(#[from] StorageError),

    #[error("Asset {0} is not a point asset")]
    NotAPoint(AssetId),

    #[error("Asset {0} not found")]
    UnknownAsset(AssetId),

    #[error("Invalid asset: {0}")]
    InvalidAsset(#[from] AssetError),
}

/// Client-side ids: creation time in milliseconds, strictly increasing
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after a restart so fresh ids never collide with cached ones
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    pub fn next_id(&self) -> AssetId {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_ms: i64) -> AssetId {
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now_ms.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return AssetId::Int(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// User-entered attributes for a new point asset
#[derive(Debug, Clone, Default)]
pub struct PointDetails {
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub voltage: Option<String>,
}

pub fn new_point_asset(
    id: AssetId,
    position: Position,
    details: &PointDetails,
    created_at: DateTime<Utc>,
) -> Result<Asset, CaptureError> {
    let mut properties = Properties::new();
    let name = details
        .name
        .clone()
        .unwrap_or_else(|| format!("P-{}", id));
    properties.insert("name".into(), json!(name));
    properties.insert(
        "type".into(),
        json!(details.asset_type.as_deref().unwrap_or("pole")),
    );
    properties.insert("status".into(), json!(AS_BUILT_STATUS));
    if let Some(voltage) = &details.voltage {
        properties.insert("voltage".into(), json!(voltage));
    }
    properties.insert("created_at".into(), json!(created_at.to_rfc3339()));

    let asset = Asset::pending(id, Geometry::Point(position), properties);
    asset.validate()?;
    Ok(asset)
}

pub fn new_cable_asset(
    id: AssetId,
    endpoints: &CableEndpoints,
    created_at: DateTime<Utc>,
) -> Result<Asset, CaptureError> {
    let mut properties = Properties::new();
    properties.insert("name".into(), json!(format!("C-{}", id)));
    properties.insert("type".into(), json!("cable"));
    properties.insert("status".into(), json!(AS_BUILT_STATUS));
    properties.insert("from".into(), serde_json::to_value(&endpoints.from_id).unwrap_or_default());
    properties.insert("to".into(), serde_json::to_value(&endpoints.to_id).unwrap_or_default());
    properties.insert("created_at".into(), json!(created_at.to_rfc3339()));

    let asset = Asset::pending(
        id,
        Geometry::LineString(vec![endpoints.from, endpoints.to]),
        properties,
    );
    asset.validate()?;
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase_within_one_millisecond() {
        let ids = IdGenerator::new();
        let a = ids.next_at(1_000);
        let b = ids.next_at(1_000);
        let c = ids.next_at(999);
        assert_eq!(a, AssetId::Int(1_000));
        assert_eq!(b, AssetId::Int(1_001));
        assert_eq!(c, AssetId::Int(1_002));
    }

    #[test]
    fn test_ids_resume_after_cached_maximum() {
        let ids = IdGenerator::starting_after(5_000);
        assert_eq!(ids.next_at(10), AssetId::Int(5_001));
    }

    #[test]
    fn test_point_asset_defaults() {
        let created = Utc::now();
        let asset = new_point_asset(
            AssetId::Int(42),
            Position::new(-1.56, 53.81),
            &PointDetails::default(),
            created,
        )
        .unwrap();

        assert!(asset.pending_sync);
        assert_eq!(asset.name(), Some("P-42"));
        assert_eq!(asset.property_str("type"), Some("pole"));
        assert_eq!(asset.status(), Some(AS_BUILT_STATUS));
        assert!(asset.properties.get("voltage").is_none());
        assert_eq!(
            asset.property_str("created_at"),
            Some(created.to_rfc3339().as_str())
        );
    }

    #[test]
    fn test_point_asset_rejects_bad_coordinates() {
        let result = new_point_asset(
            AssetId::Int(1),
            Position::new(f64::NAN, 53.81),
            &PointDetails::default(),
            Utc::now(),
        );
        assert!(matches!(result, Err(CaptureError::InvalidAsset(_))));
    }
}
