//! Durable keyed cache of asset records.
//!
//! The mutation log is not a separate structure: it is the subset of records
//! with `pending_sync` set, always read back through `query_pending()`.

use async_trait::async_trait;
use fieldsync_api::{Asset, AssetId, GeometryKind};

use super::types::{Result, StorageError};

/// Keyed asset persistence.
///
/// Every single-record write is all-or-nothing, and so is `replace_synced`.
/// `bulk_put` and `clear` are not required to be atomic as a whole.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Full snapshot, order unspecified
    async fn get_all(&self) -> Result<Vec<Asset>>;

    async fn get(&self, id: &AssetId) -> Result<Option<Asset>>;

    /// Upsert by id
    async fn put(&self, asset: Asset) -> Result<()>;

    async fn bulk_put(&self, assets: Vec<Asset>) -> Result<()>;

    async fn delete(&self, id: &AssetId) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Remove every record that is not pending, returning how many were dropped
    async fn clear_synced(&self) -> Result<usize>;

    /// Drop every synced record and write `assets` in their place, as one unit.
    /// On error the cache is left exactly as it was. Returns how many records
    /// were dropped.
    async fn replace_synced(&self, assets: Vec<Asset>) -> Result<usize>;

    async fn query_pending(&self) -> Result<Vec<Asset>>;

    /// Clear the pending flag. Returns false (and does nothing) when the id is absent.
    async fn mark_synced(&self, id: &AssetId) -> Result<bool>;
}

/// Validate an incoming write against the record it would replace
pub(crate) fn check_write(asset: &Asset, existing: Option<GeometryKind>) -> Result<()> {
    asset.validate().map_err(|source| StorageError::InvalidAsset {
        id: asset.id.clone(),
        source,
    })?;

    match existing {
        Some(kind) if kind != asset.kind() => Err(StorageError::GeometryKindChanged {
            id: asset.id.clone(),
            existing: kind,
            attempted: asset.kind(),
        }),
        _ => Ok(()),
    }
}
