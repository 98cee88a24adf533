//! Push/Pull reconciliation between the local cache and the remote authority
//!
//! Push flushes the mutation log (every pending record) in one request and
//! clears the pending flags only on a whole-batch acknowledgment. Pull replaces
//! every synced record with the remote snapshot while leaving pending records
//! exactly as they are, so the cache ends up as
//! `remote snapshot ∪ still-pending local records`.
//!
//! Push and Pull never interleave: both hold the engine's sync lock while
//! they read or write the mutation log.

use fieldsync_api::Asset;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Span};

use super::outcome::{PullOutcome, PullStats, PushOutcome};
use super::remote::RemoteAuthority;
use crate::storage::{LocalStore, Result};

pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteAuthority>,
    push_in_flight: AtomicBool,
    sync_lock: Mutex<()>,
}

/// Holds the push busy flag; releases it on drop
struct PushGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PushGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteAuthority>) -> Self {
        Self {
            store,
            remote,
            push_in_flight: AtomicBool::new(false),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn is_pushing(&self) -> bool {
        self.push_in_flight.load(Ordering::Acquire)
    }

    /// Send every pending record in one batch.
    ///
    /// A push requested while another is in flight is dropped. A push
    /// requested during a pull waits for the pull to finish. On failure all
    /// records stay pending and are resent verbatim next time; the remote
    /// upserts by id, so resending is harmless.
    #[tracing::instrument(name = "sync.push", skip(self), fields(sync.batch_size = tracing::field::Empty))]
    pub async fn push(&self) -> Result<PushOutcome> {
        let Some(_guard) = PushGuard::acquire(&self.push_in_flight) else {
            debug!("[SyncEngine] Push already in flight, dropping request");
            return Ok(PushOutcome::AlreadyRunning);
        };
        let _sync = self.sync_lock.lock().await;

        let batch = self.store.query_pending().await?;
        Span::current().record("sync.batch_size", batch.len());
        if batch.is_empty() {
            debug!("[SyncEngine] Nothing pending");
            return Ok(PushOutcome::NothingPending);
        }

        info!(
            "[SyncEngine] Pushing {} pending assets to {}",
            batch.len(),
            self.remote.remote_id()
        );

        match self.remote.push_batch(&batch).await {
            Ok(()) => {
                for asset in &batch {
                    if !self.store.mark_synced(&asset.id).await? {
                        debug!("[SyncEngine] {} left the cache before its ack", asset.id);
                    }
                }
                info!("[SyncEngine] Push acknowledged for {} assets", batch.len());
                Ok(PushOutcome::Acknowledged { count: batch.len() })
            }
            Err(e) => {
                warn!(
                    "[SyncEngine] Push failed, {} assets stay pending: {}",
                    batch.len(),
                    e
                );
                Ok(PushOutcome::Failed {
                    pending: batch.len(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Refresh the cache from the remote snapshot without touching pending records.
    ///
    /// Any transport error or malformed record aborts before the cache is
    /// modified, and a storage error while writing leaves it as it was.
    #[tracing::instrument(name = "sync.pull", skip(self))]
    pub async fn pull(&self) -> Result<PullOutcome> {
        let _sync = self.sync_lock.lock().await;
        let snapshot = match self.remote.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                info!("[SyncEngine] Pull aborted, keeping cached data: {}", e);
                return Ok(PullOutcome::Aborted {
                    reason: e.to_string(),
                });
            }
        };

        if let Some((id, err)) = snapshot
            .iter()
            .find_map(|asset| asset.validate().err().map(|e| (asset.id.clone(), e)))
        {
            warn!(
                "[SyncEngine] Pull aborted, remote sent invalid asset {}: {}",
                id, err
            );
            return Ok(PullOutcome::Aborted {
                reason: format!("invalid asset {}: {}", id, err),
            });
        }

        let snapshot = dedupe_by_id(snapshot);
        let pending_ids: HashSet<String> = self
            .store
            .query_pending()
            .await?
            .iter()
            .map(|asset| asset.id.key())
            .collect();

        let fetched = snapshot.len();
        let (shadowed, incoming): (Vec<Asset>, Vec<Asset>) = snapshot
            .into_iter()
            .partition(|asset| pending_ids.contains(&asset.id.key()));

        let stored = incoming.len();
        let replaced = self.store.replace_synced(incoming).await?;

        let stats = PullStats {
            fetched,
            replaced,
            stored,
            preserved_pending: pending_ids.len(),
            shadowed: shadowed.len(),
        };
        info!(
            "[SyncEngine] Pull merged {} remote assets (replaced={}, preserved_pending={}, shadowed={})",
            stats.stored, stats.replaced, stats.preserved_pending, stats.shadowed
        );
        Ok(PullOutcome::Merged(stats))
    }

    /// Push first so local work is flushed before the snapshot is merged
    pub async fn reconcile(&self) -> Result<(PushOutcome, PullOutcome)> {
        let pushed = self.push().await?;
        let pulled = self.pull().await?;
        Ok((pushed, pulled))
    }
}

/// Collapse repeated ids in a snapshot, last occurrence wins
fn dedupe_by_id(snapshot: Vec<Asset>) -> Vec<Asset> {
    let mut by_key: HashMap<String, Asset> = HashMap::with_capacity(snapshot.len());
    for mut asset in snapshot {
        asset.pending_sync = false;
        by_key.insert(asset.id.key(), asset);
    }
    by_key.into_values().collect()
}
