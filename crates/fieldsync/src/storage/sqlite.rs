//! SQLite-backed LocalStore
//!
//! One row per asset in the `assets` table. Geometry and properties are kept
//! as JSON text; `pending_sync` is an indexed integer flag so the mutation log
//! can be read without scanning every record.

use async_trait::async_trait;
use fieldsync_api::{Asset, AssetId, Geometry, GeometryKind, Properties};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::local_store::{check_write, LocalStore};
use super::types::{Result, StorageError};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS assets (
        id TEXT PRIMARY KEY,
        raw_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        geometry TEXT NOT NULL,
        properties TEXT NOT NULL,
        pending_sync INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_assets_pending_sync ON assets (pending_sync);
"#;

const SELECT_COLUMNS: &str = "SELECT raw_id, geometry, properties, pending_sync FROM assets";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw column values of one `assets` row
struct AssetRow {
    raw_id: String,
    geometry: String,
    properties: String,
    pending_sync: i64,
}

impl AssetRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            raw_id: row.get(0)?,
            geometry: row.get(1)?,
            properties: row.get(2)?,
            pending_sync: row.get(3)?,
        })
    }

    fn into_asset(self) -> Result<Asset> {
        let id: AssetId = serde_json::from_str(&self.raw_id)?;
        let geometry: Geometry = serde_json::from_str(&self.geometry)?;
        let properties: Properties = serde_json::from_str(&self.properties)?;
        let mut asset = Asset::synced(id, geometry, properties);
        asset.pending_sync = self.pending_sync != 0;
        Ok(asset)
    }
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("[SqliteStore] journal_mode={}", mode);
        conn.execute_batch(SCHEMA_SQL)?;

        info!("[SqliteStore] Opened asset cache at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StorageError::DatabaseError(format!("Connection lock poisoned: {}", e))
            })?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StorageError::DatabaseError(format!("Storage task failed: {}", e)))?
    }

    fn existing_kind(conn: &Connection, key: &str) -> Result<Option<GeometryKind>> {
        let kind: Option<String> = conn
            .query_row("SELECT kind FROM assets WHERE id = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match kind.as_deref() {
            None => Ok(None),
            Some("Point") => Ok(Some(GeometryKind::Point)),
            Some("LineString") => Ok(Some(GeometryKind::LineString)),
            Some(other) => Err(StorageError::SerializationError(format!(
                "Unknown geometry kind '{}' stored for asset {}",
                other, key
            ))),
        }
    }

    /// Single-statement upsert, so each record is written all-or-nothing
    fn write_one(conn: &Connection, asset: &Asset) -> Result<()> {
        let key = asset.id.key();
        check_write(asset, Self::existing_kind(conn, &key)?)?;

        conn.execute(
            r#"
            INSERT INTO assets (id, raw_id, kind, geometry, properties, pending_sync)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                raw_id = excluded.raw_id,
                geometry = excluded.geometry,
                properties = excluded.properties,
                pending_sync = excluded.pending_sync
            "#,
            params![
                key,
                serde_json::to_string(&asset.id)?,
                asset.kind().as_str(),
                serde_json::to_string(&asset.geometry)?,
                serde_json::to_string(&asset.properties)?,
                asset.pending_sync as i64,
            ],
        )?;
        Ok(())
    }

    fn select(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Asset>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, AssetRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(AssetRow::into_asset).collect()
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get_all(&self) -> Result<Vec<Asset>> {
        self.with_conn(|conn| Self::select(conn, SELECT_COLUMNS, []))
            .await
    }

    async fn get(&self, id: &AssetId) -> Result<Option<Asset>> {
        let key = id.key();
        self.with_conn(move |conn| {
            let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
            Ok(Self::select(conn, &sql, params![key])?.into_iter().next())
        })
        .await
    }

    async fn put(&self, asset: Asset) -> Result<()> {
        let id = asset.id.clone();
        let pending = asset.pending_sync;
        self.with_conn(move |conn| Self::write_one(conn, &asset))
            .await?;
        debug!("[SqliteStore] put {} (pending_sync={})", id, pending);
        Ok(())
    }

    async fn bulk_put(&self, assets: Vec<Asset>) -> Result<()> {
        let count = assets.len();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for asset in &assets {
                Self::write_one(&tx, asset)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        debug!("[SqliteStore] bulk_put {} assets", count);
        Ok(())
    }

    async fn delete(&self, id: &AssetId) -> Result<()> {
        let key = id.key();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM assets WHERE id = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let removed = self
            .with_conn(|conn| Ok(conn.execute("DELETE FROM assets", [])?))
            .await?;
        info!("[SqliteStore] Cleared {} assets", removed);
        Ok(())
    }

    async fn clear_synced(&self) -> Result<usize> {
        let removed = self
            .with_conn(|conn| Ok(conn.execute("DELETE FROM assets WHERE pending_sync = 0", [])?))
            .await?;
        debug!("[SqliteStore] Cleared {} synced assets", removed);
        Ok(removed)
    }

    async fn replace_synced(&self, assets: Vec<Asset>) -> Result<usize> {
        let count = assets.len();
        let removed = self
            .with_conn(move |conn| {
                // Dropping the transaction on error rolls the delete back
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM assets WHERE pending_sync = 0", [])?;
                for asset in &assets {
                    Self::write_one(&tx, asset)?;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        debug!(
            "[SqliteStore] Replaced {} synced assets with {}",
            removed, count
        );
        Ok(removed)
    }

    async fn query_pending(&self) -> Result<Vec<Asset>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE pending_sync = 1", SELECT_COLUMNS);
            Self::select(conn, &sql, [])
        })
        .await
    }

    async fn mark_synced(&self, id: &AssetId) -> Result<bool> {
        let key = id.key();
        let changed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE assets SET pending_sync = 0 WHERE id = ?1",
                    params![key],
                )?)
            })
            .await?;
        if changed == 0 {
            debug!("[SqliteStore] mark_synced: {} no longer cached", id);
        }
        Ok(changed > 0)
    }
}
