#![deny(warnings)]

//! Persistence layer: local snapshot cache, authoritative SQLite store and the
//! coordinator that reconciles them.

pub mod coordinator;
pub mod local;
pub mod remote;
pub mod schema;

pub use coordinator::{
    pick_newer, Candidate, LoadOutcome, PersistenceCoordinator, SaveStatus, Source, WriteState,
};
pub use local::{FileCache, LocalStore, MemoryCache, Slot};
pub use remote::{init_db, init_memory_db, MemoryRemote, RemoteRecord, RemoteStore, SqliteRemote};

use thiserror::Error;

/// Failures of either store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Returns the default SQLite URL used for the authoritative store.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Returns the default directory of the local snapshot cache.
pub fn default_cache_dir() -> &'static str {
    "./saves/cache"
}
