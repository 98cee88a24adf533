use serde::{Deserialize, Serialize};

/// Result of one Push attempt. Transport failures land here, not in `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushOutcome {
    NothingPending,
    /// Another push was in flight; the next trigger retries
    AlreadyRunning,
    Acknowledged { count: usize },
    Failed { pending: usize, reason: String },
}

/// Result of one Pull attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullOutcome {
    Merged(PullStats),
    /// Cache left untouched
    Aborted { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStats {
    /// Records in the remote snapshot (after de-duplication by id)
    pub fetched: usize,
    /// Synced local records dropped before the snapshot was written
    pub replaced: usize,
    /// Remote records written to the cache
    pub stored: usize,
    /// Local pending records kept as they were
    pub preserved_pending: usize,
    /// Remote records ignored because a pending local copy shares their id
    pub shadowed: usize,
}
