//! In-memory remote authority
//!
//! Behaves like the real backend (upsert by id on push, full snapshot on
//! fetch) and lets tests switch reachability, inject failures and delays, and
//! count requests.

use async_trait::async_trait;
use fieldsync_api::{Asset, AssetId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::sync::{RemoteAuthority, TransportError, TransportResult};

#[derive(Default)]
pub struct FakeRemote {
    assets: Mutex<HashMap<String, Asset>>,
    unreachable: AtomicBool,
    fail_push: AtomicBool,
    drop_ack: AtomicBool,
    malformed_snapshot: AtomicBool,
    probe_delay: Mutex<Option<Duration>>,
    fetch_delay: Mutex<Option<Duration>>,
    push_delay: Mutex<Option<Duration>>,
    probe_requests: AtomicUsize,
    push_requests: AtomicUsize,
    pushed_batches: Mutex<Vec<Vec<AssetId>>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let remote = Self::new();
        for asset in assets {
            remote.insert(asset);
        }
        remote
    }

    /// Store an asset directly, as if another client had uploaded it
    pub fn insert(&self, mut asset: Asset) {
        asset.pending_sync = false;
        self.lock_assets().insert(asset.id.key(), asset);
    }

    pub fn remove(&self, id: &AssetId) {
        self.lock_assets().remove(&id.key());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Apply pushes but report a timeout, as when the acknowledgment is lost
    pub fn set_drop_ack(&self, drop_ack: bool) {
        self.drop_ack.store(drop_ack, Ordering::SeqCst);
    }

    pub fn set_malformed_snapshot(&self, malformed: bool) {
        self.malformed_snapshot.store(malformed, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Option<Duration>) {
        *self.probe_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Delay the snapshot response. The snapshot is taken when the request
    /// arrives, so it goes stale while the delay runs.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn set_push_delay(&self, delay: Option<Duration>) {
        *self.push_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn remote_assets(&self) -> Vec<Asset> {
        self.lock_assets().values().cloned().collect()
    }

    pub fn get(&self, id: &AssetId) -> Option<Asset> {
        self.lock_assets().get(&id.key()).cloned()
    }

    pub fn probe_requests(&self) -> usize {
        self.probe_requests.load(Ordering::SeqCst)
    }

    pub fn push_requests(&self) -> usize {
        self.push_requests.load(Ordering::SeqCst)
    }

    pub fn pushed_batches(&self) -> Vec<Vec<AssetId>> {
        self.pushed_batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_assets(&self) -> std::sync::MutexGuard<'_, HashMap<String, Asset>> {
        self.assets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    async fn delay(slot: &Mutex<Option<Duration>>) {
        let delay = *slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteAuthority for FakeRemote {
    async fn probe(&self) -> TransportResult<()> {
        self.probe_requests.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.probe_delay).await;
        if self.is_reachable() {
            Ok(())
        } else {
            Err(TransportError::Network("fake remote unreachable".to_string()))
        }
    }

    async fn fetch_snapshot(&self) -> TransportResult<Vec<Asset>> {
        if !self.is_reachable() {
            return Err(TransportError::Network("fake remote unreachable".to_string()));
        }
        if self.malformed_snapshot.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol(
                "Expected a FeatureCollection".to_string(),
            ));
        }
        let snapshot = self.remote_assets();
        Self::delay(&self.fetch_delay).await;
        Ok(snapshot)
    }

    async fn push_batch(&self, assets: &[Asset]) -> TransportResult<()> {
        self.push_requests.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.push_delay).await;

        if !self.is_reachable() {
            return Err(TransportError::Network("fake remote unreachable".to_string()));
        }
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        self.pushed_batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(assets.iter().map(|a| a.id.clone()).collect());
        for asset in assets {
            self.insert(asset.clone());
        }

        if self.drop_ack.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    fn remote_id(&self) -> &str {
        "fake"
    }
}
