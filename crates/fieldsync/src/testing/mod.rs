//! Test support: an in-memory remote authority and asset builders.
//!
//! Compiled into the library so integration tests and the CLI demo mode can
//! use it.

pub mod fake_remote;

pub use fake_remote::FakeRemote;

use fieldsync_api::{Asset, AssetId, Geometry, Position, Properties};
use serde_json::json;

/// A pole at a fixed spot in Leeds
pub fn sample_pole(id: i64, name: &str, pending: bool) -> Asset {
    let mut properties = Properties::new();
    properties.insert("name".into(), json!(name));
    properties.insert("type".into(), json!("pole"));
    properties.insert("status".into(), json!("Proposed"));

    let offset = (id % 100) as f64 * 0.0001;
    let mut asset = Asset::synced(
        AssetId::Int(id),
        Geometry::Point(Position::new(-1.5491 + offset, 53.8008 + offset)),
        properties,
    );
    asset.pending_sync = pending;
    asset
}

/// A cable between the positions of two `sample_pole`s
pub fn sample_cable(id: &str, from: i64, to: i64, pending: bool) -> Asset {
    let mut properties = Properties::new();
    properties.insert("name".into(), json!(id));
    properties.insert("type".into(), json!("cable"));
    properties.insert("from".into(), json!(from));
    properties.insert("to".into(), json!(to));

    let mut positions = Vec::with_capacity(2);
    for pole_id in [from, to] {
        positions.extend(sample_pole(pole_id, "", false).geometry.positions());
    }

    let mut asset = Asset::synced(
        AssetId::Text(id.to_string()),
        Geometry::LineString(positions),
        properties,
    );
    asset.pending_sync = pending;
    asset
}
