//! Shared data model for the field sync engine.

pub mod asset;
pub mod connectivity;

pub use asset::{Asset, AssetError, AssetId, Geometry, GeometryKind, Position, Properties};
pub use connectivity::{ConnectivityEvent, ConnectivityState, EnvironmentSignal};
