//! Local snapshot cache with a primary and a backup slot per player.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use miner_core::PlayerId;
use tracing::debug;

use crate::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Primary,
    /// Previous good write; read when the primary fails validation.
    Backup,
}

/// Device-local key/value snapshot cache.
pub trait LocalStore: Send + Sync {
    fn read(&self, player: &PlayerId, slot: Slot) -> Result<Option<String>, StoreError>;
    fn write(&self, player: &PlayerId, slot: Slot, payload: &str) -> Result<(), StoreError>;
}

/// One JSON file per player and slot under a cache directory.
#[derive(Clone, Debug)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One file per player and slot. Ids are escaped byte-wise (`_` plus two
    /// hex digits for anything outside `[A-Za-z0-9-]`) so distinct ids never
    /// share a file and none can leave the directory.
    fn path(&self, player: &PlayerId, slot: Slot) -> PathBuf {
        let mut stem = String::with_capacity(player.as_str().len());
        for b in player.as_str().bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                stem.push(char::from(b));
            } else {
                stem.push_str(&format!("_{b:02x}"));
            }
        }
        let name = match slot {
            Slot::Primary => format!("{stem}.json"),
            Slot::Backup => format!("{stem}.backup.json"),
        };
        self.dir.join(name)
    }
}

impl LocalStore for FileCache {
    fn read(&self, player: &PlayerId, slot: Slot) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(player, slot)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, player: &PlayerId, slot: Slot, payload: &str) -> Result<(), StoreError> {
        let path = self.path(player, slot);
        // Write-then-rename keeps a torn write from replacing a good file.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), bytes = payload.len(), "cache slot written");
        Ok(())
    }
}

/// Process-local cache, used by tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<(PlayerId, Slot), String>>,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, as a full or read-only disk would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a slot directly, bypassing the failure switch.
    pub fn put(&self, player: &PlayerId, slot: Slot, payload: impl Into<String>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert((player.clone(), slot), payload.into());
    }
}

impl LocalStore for MemoryCache {
    fn read(&self, player: &PlayerId, slot: Slot) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(&(player.clone(), slot)).cloned())
    }

    fn write(&self, player: &PlayerId, slot: Slot, payload: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("local cache rejected write".into()));
        }
        self.put(player, slot, payload);
        Ok(())
    }
}
