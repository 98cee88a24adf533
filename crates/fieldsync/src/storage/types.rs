use fieldsync_api::{AssetError, AssetId, GeometryKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid asset {id}: {source}")]
    InvalidAsset {
        id: AssetId,
        #[source]
        source: AssetError,
    },

    #[error("Asset {id} is a {existing}, refusing to overwrite it with a {attempted}")]
    GeometryKindChanged {
        id: AssetId,
        existing: GeometryKind,
        attempted: GeometryKind,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
