//! Read-only view handed to the map layer.
//!
//! This is the only place where positions are swapped to (latitude,
//! longitude). Each feature carries the asset id and an explicit role, so the
//! map never has to inspect styling to decide what a marker is.

use fieldsync_api::{Asset, AssetId, GeometryKind};
use serde::Serialize;

use crate::capture::AS_BUILT_STATUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapRole {
    /// Part of the proposed design delivered by the remote
    Design,
    /// Recorded in the field
    AsBuilt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFeature {
    pub asset_id: AssetId,
    pub role: MapRole,
    pub kind: GeometryKind,
    /// `[lat, lng]` pairs
    pub lat_lngs: Vec<[f64; 2]>,
    pub label: String,
}

impl From<&Asset> for MapFeature {
    fn from(asset: &Asset) -> Self {
        let role = if asset.status() == Some(AS_BUILT_STATUS) {
            MapRole::AsBuilt
        } else {
            MapRole::Design
        };
        let name = asset
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| asset.id.to_string());

        MapFeature {
            asset_id: asset.id.clone(),
            role,
            kind: asset.kind(),
            lat_lngs: asset
                .geometry
                .positions()
                .into_iter()
                .map(|p| [p.lat, p.lng])
                .collect(),
            label: format!("{} (Status: {})", name, asset.status().unwrap_or("unknown")),
        }
    }
}

/// Map features for a cache snapshot, ordered by id key
pub fn map_features(assets: &[Asset]) -> Vec<MapFeature> {
    let mut features: Vec<MapFeature> = assets.iter().map(MapFeature::from).collect();
    features.sort_by_key(|f| f.asset_id.key());
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_cable, sample_pole};
    use serde_json::json;

    #[test]
    fn test_coordinates_are_swapped_at_the_boundary() {
        let pole = sample_pole(1, "P-01", false);
        let feature = MapFeature::from(&pole);

        let position = pole.geometry.positions()[0];
        assert_eq!(feature.lat_lngs, vec![[position.lat, position.lng]]);
        assert_eq!(feature.kind, GeometryKind::Point);
        assert_eq!(feature.label, "P-01 (Status: Proposed)");
        assert_eq!(feature.role, MapRole::Design);
    }

    #[test]
    fn test_role_comes_from_status_not_sync_flag() {
        let mut captured = sample_cable("c-1", 1, 2, false);
        captured
            .properties
            .insert("status".into(), json!(AS_BUILT_STATUS));
        let pending_design = sample_pole(2, "P-02", true);

        let features = map_features(&[pending_design, captured]);

        assert_eq!(features[0].asset_id, AssetId::Int(2));
        assert_eq!(features[0].role, MapRole::Design);
        assert_eq!(features[1].asset_id, AssetId::Text("c-1".into()));
        assert_eq!(features[1].role, MapRole::AsBuilt);
        assert_eq!(features[1].lat_lngs.len(), 2);
    }
}
