//! Read/write path to both stores and reconciliation on load.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use miner_core::{EngineConfig, GameState, PlayerId};
use miner_econ::{apply_catch_up, compute_catch_up, fresh_state, CatchUp};
use tracing::{debug, info, warn};

use crate::local::{LocalStore, Slot};
use crate::remote::{RemoteRecord, RemoteStore};
use crate::{schema, StoreError};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteState {
    Idle = 0,
    Saved = 1,
    Failed = 2,
}

impl WriteState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Saved,
            2 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Outcome of the most recent write to each store, readable from any thread.
#[derive(Debug, Default)]
pub struct SaveStatus {
    local: AtomicU8,
    remote: AtomicU8,
}

impl SaveStatus {
    pub fn local(&self) -> WriteState {
        WriteState::from_u8(self.local.load(Ordering::Relaxed))
    }

    pub fn remote(&self) -> WriteState {
        WriteState::from_u8(self.remote.load(Ordering::Relaxed))
    }

    fn set_local(&self, state: WriteState) {
        self.local.store(state as u8, Ordering::Relaxed);
    }

    fn set_remote(&self, state: WriteState) {
        self.remote.store(state as u8, Ordering::Relaxed);
    }
}

/// Where the loaded state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Local,
    Backup,
    Remote,
    Fresh,
}

/// A validated snapshot and its authority timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub state: GameState,
    pub written_at: DateTime<Utc>,
    pub source: Source,
}

/// Newer authority timestamp wins in full; the remote wins a tie.
pub fn pick_newer(local: Option<Candidate>, remote: Option<Candidate>) -> Option<Candidate> {
    match (local, remote) {
        (Some(l), Some(r)) => {
            if l.written_at > r.written_at {
                Some(l)
            } else {
                Some(r)
            }
        }
        (l, r) => r.or(l),
    }
}

#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub state: GameState,
    pub source: Source,
    pub catch_up: CatchUp,
}

pub struct PersistenceCoordinator<L, R> {
    player: PlayerId,
    local: L,
    remote: R,
    config: EngineConfig,
    remote_timeout: Duration,
    status: SaveStatus,
}

impl<L: LocalStore, R: RemoteStore> PersistenceCoordinator<L, R> {
    pub fn new(player: PlayerId, local: L, remote: R, config: EngineConfig) -> Self {
        Self {
            player,
            local,
            remote,
            config,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            status: SaveStatus::default(),
        }
    }

    /// Bound on how long a remote read or write may take before it is
    /// treated as failed.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Write the full state to the primary and backup slots.
    pub fn save_local(&self, state: &GameState) -> Result<(), StoreError> {
        let result = schema::encode(state).and_then(|payload| {
            self.local.write(&self.player, Slot::Primary, &payload)?;
            self.local.write(&self.player, Slot::Backup, &payload)
        });
        match &result {
            Ok(()) => self.status.set_local(WriteState::Saved),
            Err(e) => {
                self.status.set_local(WriteState::Failed);
                warn!(player = %self.player, error = %e, "local save failed");
            }
        }
        result
    }

    /// Upsert the state into the remote store. Failures are logged and
    /// flagged; local state is never rolled back.
    pub async fn save_remote(&self, state: &GameState) -> Result<(), StoreError> {
        let record = RemoteRecord {
            game_data: schema::encode(state)?,
            last_updated: state.last_update,
        };
        let result = match tokio::time::timeout(
            self.remote_timeout,
            self.remote.upsert(&self.player, &record),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable("remote save timed out".into())),
        };
        match &result {
            Ok(()) => {
                self.status.set_remote(WriteState::Saved);
                debug!(player = %self.player, "remote save complete");
            }
            Err(e) => {
                self.status.set_remote(WriteState::Failed);
                warn!(player = %self.player, error = %e, "remote save failed");
            }
        }
        result
    }

    fn local_candidate(&self, now_ms: i64) -> Option<Candidate> {
        for (slot, source) in [(Slot::Primary, Source::Local), (Slot::Backup, Source::Backup)] {
            match self.local.read(&self.player, slot) {
                Ok(Some(raw)) => match schema::decode(&raw, now_ms) {
                    Ok(state) => {
                        return Some(Candidate {
                            written_at: state.last_update,
                            state,
                            source,
                        })
                    }
                    Err(e) => {
                        warn!(player = %self.player, ?slot, error = %e, "local snapshot rejected")
                    }
                },
                Ok(None) => {}
                Err(e) => warn!(player = %self.player, ?slot, error = %e, "local read failed"),
            }
        }
        None
    }

    async fn remote_candidate(&self, now_ms: i64) -> Option<Candidate> {
        let fetched = tokio::time::timeout(self.remote_timeout, self.remote.fetch(&self.player))
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable("remote load timed out".into())));
        let record = match fetched {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(player = %self.player, error = %e, "remote load failed, using local data");
                return None;
            }
        };
        match schema::decode(&record.game_data, now_ms) {
            Ok(state) => Some(Candidate {
                state,
                written_at: record.last_updated,
                source: Source::Remote,
            }),
            Err(e) => {
                warn!(player = %self.player, error = %e, "remote snapshot rejected");
                None
            }
        }
    }

    /// Reconcile both stores, apply offline catch-up and persist the result
    /// before handing it out, so the same offline window is never credited
    /// twice.
    pub async fn load(&self, now_ms: i64) -> LoadOutcome {
        let local = self.local_candidate(now_ms);
        let remote = self.remote_candidate(now_ms).await;
        let (snapshot, source) = match pick_newer(local, remote) {
            Some(winner) => (winner.state, winner.source),
            None => {
                info!(player = %self.player, "no usable snapshot, starting fresh");
                (fresh_state(now_ms, &self.config), Source::Fresh)
            }
        };

        let catch_up =
            compute_catch_up(&snapshot, now_ms, &self.config.offline, &self.config.energy);
        let mut state = apply_catch_up(&snapshot, &catch_up, now_ms);
        state.session_start_time = now_ms;
        state.stamp_saved(now_ms);
        info!(
            player = %self.player,
            ?source,
            offline_ms = catch_up.elapsed_ms,
            pending = state.unclaimed_offline_rewards,
            "session state loaded"
        );

        // Errors are already logged and flagged.
        let _ = self.save_local(&state);
        let _ = self.save_remote(&state).await;

        LoadOutcome {
            state,
            source,
            catch_up,
        }
    }
}
