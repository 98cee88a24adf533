//! In-memory LocalStore used by tests and demos

use async_trait::async_trait;
use fieldsync_api::{Asset, AssetId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::local_store::{check_write, LocalStore};
use super::types::Result;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Asset>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let records = assets
            .into_iter()
            .map(|asset| (asset.id.key(), asset))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn write_one(records: &mut HashMap<String, Asset>, asset: Asset) -> Result<()> {
        let key = asset.id.key();
        check_write(&asset, records.get(&key).map(Asset::kind))?;
        records.insert(key, asset);
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<Asset>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &AssetId) -> Result<Option<Asset>> {
        Ok(self.records.read().await.get(&id.key()).cloned())
    }

    async fn put(&self, asset: Asset) -> Result<()> {
        let mut records = self.records.write().await;
        Self::write_one(&mut records, asset)
    }

    async fn bulk_put(&self, assets: Vec<Asset>) -> Result<()> {
        let mut records = self.records.write().await;
        for asset in assets {
            Self::write_one(&mut records, asset)?;
        }
        Ok(())
    }

    async fn delete(&self, id: &AssetId) -> Result<()> {
        self.records.write().await.remove(&id.key());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn clear_synced(&self) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, asset| asset.pending_sync);
        Ok(before - records.len())
    }

    async fn replace_synced(&self, assets: Vec<Asset>) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut next: HashMap<String, Asset> = records
            .iter()
            .filter(|(_, asset)| asset.pending_sync)
            .map(|(key, asset)| (key.clone(), asset.clone()))
            .collect();
        let removed = records.len() - next.len();
        for asset in assets {
            Self::write_one(&mut next, asset)?;
        }
        *records = next;
        Ok(removed)
    }

    async fn query_pending(&self) -> Result<Vec<Asset>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|asset| asset.pending_sync)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, id: &AssetId) -> Result<bool> {
        match self.records.write().await.get_mut(&id.key()) {
            Some(asset) => {
                asset.pending_sync = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
