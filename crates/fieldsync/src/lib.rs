//! Offline-first synchronization for field-captured network assets.
//!
//! A local cache ([`storage`]) is the source of truth for rendering. Edits made
//! in the field ([`capture`]) are written there with a pending flag, pushed to
//! the remote authority ([`sync`]) whenever the [`connectivity`] monitor says
//! it is reachable, and the cache is refreshed from the remote snapshot without
//! ever dropping local work. [`SyncContext`] wires the pieces together.

pub mod capture;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod render;
pub mod storage;
pub mod sync;
pub mod testing;

pub use config::SyncConfig;
pub use context::SyncContext;
pub use fieldsync_api as api;
