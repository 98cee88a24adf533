//! SyncContext: the one value that owns the cache, the connectivity monitor
//! and the sync engine, and drives them from a single cooperative loop.

use chrono::Utc;
use fieldsync_api::{
    Asset, AssetId, ConnectivityEvent, ConnectivityState, EnvironmentSignal, Position,
};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capture::{
    new_cable_asset, new_point_asset, CaptureError, IdGenerator, LineSelection, LineTool,
    PointDetails,
};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::render::{map_features, MapFeature};
use crate::storage::{LocalStore, Result, SqliteStore};
use crate::sync::{HttpRemote, PullOutcome, RemoteAuthority, SyncEngine};

pub struct SyncContext {
    store: Arc<dyn LocalStore>,
    monitor: ConnectivityMonitor,
    engine: SyncEngine,
    ids: IdGenerator,
    line_tool: Mutex<LineTool>,
    push_on_capture: bool,
}

impl SyncContext {
    /// Wire up a context over an existing store and remote.
    ///
    /// Reads the cache once so locally generated ids continue after the
    /// largest integer id already present.
    pub async fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteAuthority>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let last_id = store
            .get_all()
            .await?
            .iter()
            .filter_map(|asset| match asset.id {
                AssetId::Int(i) => Some(i),
                AssetId::Text(_) => None,
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            monitor: ConnectivityMonitor::new(
                remote.clone(),
                config.probe_interval(),
                config.probe_timeout(),
            ),
            engine: SyncEngine::new(store.clone(), remote),
            store,
            ids: IdGenerator::starting_after(last_id),
            line_tool: Mutex::new(LineTool::new()),
            push_on_capture: config.push_on_capture,
        })
    }

    /// SQLite cache plus HTTP remote, as configured
    pub async fn open(config: &SyncConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        let remote = Arc::new(HttpRemote::new(
            &config.remote_url,
            config.request_timeout(),
        )?);
        Ok(Self::new(store, remote, config).await?)
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn state(&self) -> ConnectivityState {
        self.monitor.state()
    }

    pub fn badge_label(&self) -> &'static str {
        self.monitor.badge_label()
    }

    /// Everything the map should show, straight from the cache
    pub async fn map_features(&self) -> Result<Vec<MapFeature>> {
        Ok(map_features(&self.store.get_all().await?))
    }

    pub async fn pending(&self) -> Result<Vec<Asset>> {
        self.store.query_pending().await
    }

    pub async fn initial_load(&self) -> Result<PullOutcome> {
        info!("[SyncContext] Initial load");
        self.engine.pull().await
    }

    /// Place a new point asset. Fails only if the edit could not be stored.
    pub async fn capture_point(
        &self,
        position: Position,
        details: PointDetails,
    ) -> std::result::Result<Asset, CaptureError> {
        let asset = new_point_asset(self.ids.next_id(), position, &details, Utc::now())?;
        self.store.put(asset.clone()).await?;
        info!("[SyncContext] Captured point asset {}", asset.id);
        self.push_if_online().await;
        Ok(asset)
    }

    /// Re-selecting the line tool drops any half-built cable
    pub fn activate_line_tool(&self) {
        self.lock_line_tool().activate();
    }

    pub fn cancel_line_tool(&self) {
        self.lock_line_tool().cancel();
    }

    pub fn line_tool_idle(&self) -> bool {
        self.lock_line_tool().is_idle()
    }

    /// Feed a selected point asset to the line tool.
    ///
    /// Returns the new cable once the second node is selected.
    pub async fn select_for_cable(
        &self,
        id: &AssetId,
    ) -> std::result::Result<Option<Asset>, CaptureError> {
        let node = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CaptureError::UnknownAsset(id.clone()))?;

        let selection = self.lock_line_tool().select(&node)?;
        let endpoints = match selection {
            LineSelection::Completed(endpoints) => endpoints,
            other => {
                debug!("[SyncContext] Line tool: {:?} at {}", other, id);
                return Ok(None);
            }
        };

        let cable = new_cable_asset(self.ids.next_id(), &endpoints, Utc::now())?;
        self.store.put(cable.clone()).await?;
        info!(
            "[SyncContext] Captured cable {} from {} to {}",
            cable.id, endpoints.from_id, endpoints.to_id
        );
        self.push_if_online().await;
        Ok(Some(cable))
    }

    async fn push_if_online(&self) {
        if !self.push_on_capture || self.monitor.state() != ConnectivityState::Online {
            return;
        }
        match self.engine.push().await {
            Ok(outcome) => debug!("[SyncContext] Push after capture: {:?}", outcome),
            // The capture itself is stored; the next trigger retries the push
            Err(e) => warn!("[SyncContext] Push after capture failed: {}", e),
        }
    }

    /// React to a connectivity transition
    pub async fn on_event(&self, event: ConnectivityEvent) -> Result<()> {
        match event {
            ConnectivityEvent::Reconnected => {
                let (pushed, pulled) = self.engine.reconcile().await?;
                info!(
                    "[SyncContext] Reconnected: push={:?}, pull={:?}",
                    pushed, pulled
                );
            }
            ConnectivityEvent::Disconnected => {
                let pending = self.store.query_pending().await?.len();
                info!(
                    "[SyncContext] Disconnected, {} assets waiting to sync",
                    pending
                );
            }
        }
        Ok(())
    }

    /// One heartbeat: probe, then sync if the probe caused a transition
    pub async fn probe_and_sync(&self) -> Result<Option<ConnectivityEvent>> {
        let event = self.monitor.probe_once().await;
        if let Some(event) = event {
            self.on_event(event).await?;
        }
        Ok(event)
    }

    pub async fn handle_signal(&self, signal: EnvironmentSignal) -> Result<()> {
        match signal {
            EnvironmentSignal::NetworkDown => {
                if let Some(event) = self.monitor.handle_signal(signal) {
                    self.on_event(event).await?;
                }
            }
            // Only a successful probe may bring us online
            EnvironmentSignal::NetworkUp => {
                self.probe_and_sync().await?;
            }
        }
        Ok(())
    }

    /// Initial load, then probe on every tick until `shutdown` resolves.
    ///
    /// Everything runs on this one task, so probes, pushes, pulls and signal
    /// handling never overlap.
    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<EnvironmentSignal>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        self.initial_load().await?;

        let mut ticker = self.monitor.ticker();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("[SyncContext] Shutting down");
                    break;
                }
                Some(signal) = signals.recv() => {
                    self.handle_signal(signal).await?;
                }
                _ = ticker.tick() => {
                    self.probe_and_sync().await?;
                }
            }
        }
        Ok(())
    }

    fn lock_line_tool(&self) -> MutexGuard<'_, LineTool> {
        self.line_tool.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::sync::PushOutcome;
    use crate::testing::{sample_pole, FakeRemote};
    use fieldsync_api::Geometry;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn context(store: &Arc<MemoryStore>, remote: &Arc<FakeRemote>) -> SyncContext {
        SyncContext::new(store.clone(), remote.clone(), &SyncConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ids_continue_after_cached_maximum() {
        let far_future = 9_000_000_000_000;
        let store = Arc::new(MemoryStore::with_assets([sample_pole(far_future, "P", false)]));
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(false);

        let asset = ctx
            .capture_point(Position::new(-1.56, 53.81), PointDetails::default())
            .await
            .unwrap();

        assert_eq!(asset.id, AssetId::Int(far_future + 1));
    }

    #[tokio::test]
    async fn test_offline_capture_stays_pending() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(false);

        let asset = ctx
            .capture_point(Position::new(-1.56, 53.81), PointDetails::default())
            .await
            .unwrap();

        assert!(asset.pending_sync);
        assert_eq!(ctx.pending().await.unwrap(), vec![asset]);
        assert_eq!(remote.push_requests(), 0);
        assert_eq!(ctx.badge_label(), "Offline Mode");
    }

    #[tokio::test]
    async fn test_online_capture_pushes_immediately() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(true);

        let asset = ctx
            .capture_point(Position::new(-1.56, 53.81), PointDetails::default())
            .await
            .unwrap();

        assert_eq!(remote.push_requests(), 1);
        assert!(remote.get(&asset.id).is_some());
        assert!(ctx.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_after_capture_keeps_the_capture() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        remote.set_fail_push(true);
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(true);

        let asset = ctx
            .capture_point(Position::new(-1.56, 53.81), PointDetails::default())
            .await
            .unwrap();

        let stored = store.get(&asset.id).await.unwrap().unwrap();
        assert!(stored.pending_sync);
    }

    #[tokio::test]
    async fn test_cable_between_two_points() {
        let a = sample_pole(1, "A", false);
        let b = sample_pole(2, "B", false);
        let store = Arc::new(MemoryStore::with_assets([a.clone(), b.clone()]));
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(false);
        ctx.activate_line_tool();

        assert_eq!(ctx.select_for_cable(&a.id).await.unwrap(), None);
        assert!(!ctx.line_tool_idle());
        let cable = ctx.select_for_cable(&b.id).await.unwrap().unwrap();

        assert!(ctx.line_tool_idle());
        assert!(cable.pending_sync);
        let mut expected = a.geometry.positions();
        expected.extend(b.geometry.positions());
        assert_eq!(cable.geometry, Geometry::LineString(expected));
        assert_eq!(cable.status(), Some("as-built"));
        assert!(store.get(&cable.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_selecting_unknown_asset_fails() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;

        let err = ctx.select_for_cable(&AssetId::Int(404)).await.unwrap_err();
        assert!(matches!(err, CaptureError::UnknownAsset(AssetId::Int(404))));
        assert!(ctx.line_tool_idle());
    }

    #[tokio::test]
    async fn test_reconnect_flushes_then_refreshes() {
        let store = Arc::new(MemoryStore::with_assets([sample_pole(1, "local", true)]));
        let remote = Arc::new(FakeRemote::with_assets([sample_pole(2, "remote", false)]));
        let ctx = context(&store, &remote).await;
        ctx.monitor().apply_probe_result(false);

        let event = ctx.probe_and_sync().await.unwrap();

        assert_eq!(event, Some(ConnectivityEvent::Reconnected));
        assert_eq!(remote.push_requests(), 1);
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|a| !a.pending_sync));
    }

    #[tokio::test]
    async fn test_network_down_then_up() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let ctx = context(&store, &remote).await;
        ctx.probe_and_sync().await.unwrap();
        assert_eq!(ctx.state(), ConnectivityState::Online);

        ctx.handle_signal(EnvironmentSignal::NetworkDown).await.unwrap();
        assert_eq!(ctx.state(), ConnectivityState::Offline);

        remote.set_reachable(false);
        ctx.handle_signal(EnvironmentSignal::NetworkUp).await.unwrap();
        assert_eq!(ctx.state(), ConnectivityState::Offline);

        remote.set_reachable(true);
        ctx.handle_signal(EnvironmentSignal::NetworkUp).await.unwrap();
        assert_eq!(ctx.state(), ConnectivityState::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_probes_until_shutdown() {
        let store = Arc::new(MemoryStore::with_assets([sample_pole(1, "queued", true)]));
        let remote = Arc::new(FakeRemote::with_assets([sample_pole(2, "remote", false)]));
        let ctx = Arc::new(context(&store, &remote).await);
        let (_signal_tx, signal_rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.run(signal_rx, async {
                    let _ = stop_rx.await;
                })
                .await
            })
        };

        // Initial load plus the first tick and two more intervals
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(remote.probe_requests(), 3);
        assert_eq!(ctx.state(), ConnectivityState::Online);
        assert!(ctx.pending().await.unwrap().is_empty());
        assert_eq!(ctx.engine().push().await.unwrap(), PushOutcome::NothingPending);
        assert_eq!(ctx.map_features().await.unwrap().len(), 2);
    }
}
