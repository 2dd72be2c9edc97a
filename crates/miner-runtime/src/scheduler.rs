//! Named, cancellable periodic tasks on a virtual clock.
//!
//! The scheduler never sleeps. Callers pass the current time to
//! [`Scheduler::advance`], which fires every due task in deadline order
//! against the ledger. Tasks arm and cancel themselves from the state each
//! firing leaves behind.

use std::collections::BTreeMap;

use miner_core::config::TickPeriods;
use miner_core::GameState;
use tracing::{debug, info, warn};

use crate::ledger::{Ledger, TickReport};

/// Upper bound on firings per `advance` call. A clock that jumps further
/// than this re-bases the remaining deadlines instead of replaying them.
const MAX_FIRINGS_PER_ADVANCE: usize = 100_000;

/// Ordered so that on equal deadlines transitions run before saves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    MiningTick,
    EnergyRegen,
    LocalSave,
    RemoteSync,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::MiningTick,
        TaskKind::EnergyRegen,
        TaskKind::LocalSave,
        TaskKind::RemoteSync,
    ];

    fn period_ms(self, periods: &TickPeriods) -> i64 {
        let ms = match self {
            TaskKind::MiningTick => periods.mining_ms,
            TaskKind::EnergyRegen => periods.regen_ms,
            TaskKind::LocalSave => periods.local_save_ms,
            TaskKind::RemoteSync => periods.remote_sync_ms,
        };
        ms.max(1).min(i64::MAX as u64) as i64
    }

    fn wanted(self, state: &GameState) -> bool {
        match self {
            TaskKind::MiningTick | TaskKind::LocalSave | TaskKind::RemoteSync => state.is_mining,
            TaskKind::EnergyRegen => state.needs_regen(),
        }
    }
}

/// Something that happened during `advance`, in firing order.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    Mined { at_ms: i64, report: TickReport },
    Regenerated { at_ms: i64 },
    MiningHalted { at_ms: i64 },
    AutoMiningStarted { at_ms: i64 },
    SaveLocal { at_ms: i64 },
    SyncRemote { at_ms: i64 },
}

impl SchedulerEvent {
    /// Deadline the event fired at.
    pub fn at_ms(&self) -> i64 {
        match *self {
            SchedulerEvent::Mined { at_ms, .. }
            | SchedulerEvent::Regenerated { at_ms }
            | SchedulerEvent::MiningHalted { at_ms }
            | SchedulerEvent::AutoMiningStarted { at_ms }
            | SchedulerEvent::SaveLocal { at_ms }
            | SchedulerEvent::SyncRemote { at_ms } => at_ms,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct AutoTrigger {
    /// Cleared by a manual stop, set again by a manual start.
    enabled: bool,
    was_ready: bool,
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    periods: TickPeriods,
    armed: BTreeMap<TaskKind, i64>,
    auto: AutoTrigger,
}

impl Scheduler {
    pub fn new(periods: TickPeriods) -> Self {
        Self {
            periods,
            armed: BTreeMap::new(),
            auto: AutoTrigger {
                enabled: true,
                was_ready: false,
            },
        }
    }

    pub fn is_armed(&self, kind: TaskKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TaskKind) -> Option<i64> {
        self.armed.get(&kind).copied()
    }

    /// Earliest pending deadline, if any task is armed.
    pub fn next_deadline(&self) -> Option<i64> {
        self.armed.values().copied().min()
    }

    /// Arm tasks whose condition now holds and cancel those whose condition
    /// no longer does. Newly armed tasks first fire one period after `now_ms`.
    pub fn sync(&mut self, state: &GameState, now_ms: i64) {
        for kind in TaskKind::ALL {
            let wanted = kind.wanted(state);
            if wanted && !self.armed.contains_key(&kind) {
                let at = now_ms.saturating_add(kind.period_ms(&self.periods));
                self.armed.insert(kind, at);
                debug!(?kind, at, "task armed");
            } else if !wanted && self.armed.remove(&kind).is_some() {
                debug!(?kind, "task cancelled");
            }
        }
    }

    /// Record a player's own start or stop. Stopping by hand keeps
    /// automation from restarting mining until the player starts it again.
    pub fn manual_toggle(&mut self, now_mining: bool) {
        self.auto.enabled = now_mining;
    }

    /// Start mining through automation on the rising edge of readiness.
    pub fn evaluate_auto_mining(&mut self, ledger: &mut Ledger, now_ms: i64) -> bool {
        let ready = ledger.auto_mining_ready();
        let rising = ready && !self.auto.was_ready;
        self.auto.was_ready = ready;
        if !(rising && self.auto.enabled) {
            return false;
        }
        match ledger.toggle_mining() {
            Ok(true) => {
                info!(at = now_ms, "auto-mining started");
                self.sync(ledger.state(), now_ms);
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(error = %e, "auto-mining refused");
                false
            }
        }
    }

    fn due(&self, now_ms: i64) -> Option<(TaskKind, i64)> {
        self.armed
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .min_by_key(|(kind, at)| (**at, **kind))
            .map(|(kind, at)| (*kind, *at))
    }

    /// Fire every task due at or before `now_ms`, oldest deadline first.
    pub fn advance(&mut self, ledger: &mut Ledger, now_ms: i64) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        let mut fired = 0usize;
        while let Some((kind, at)) = self.due(now_ms) {
            if fired == MAX_FIRINGS_PER_ADVANCE {
                warn!(fired, "clock jumped too far, skipping missed ticks");
                for deadline in self.armed.values_mut() {
                    if *deadline <= now_ms {
                        *deadline = now_ms + 1;
                    }
                }
                break;
            }
            fired += 1;
            let period = kind.period_ms(&self.periods);
            self.armed.insert(kind, at.saturating_add(period));
            match kind {
                TaskKind::MiningTick => {
                    let report = ledger.mining_tick();
                    events.push(SchedulerEvent::Mined { at_ms: at, report });
                    if report.halted {
                        events.push(SchedulerEvent::MiningHalted { at_ms: at });
                    }
                }
                TaskKind::EnergyRegen => {
                    ledger.regen_tick(at);
                    events.push(SchedulerEvent::Regenerated { at_ms: at });
                }
                TaskKind::LocalSave => events.push(SchedulerEvent::SaveLocal { at_ms: at }),
                TaskKind::RemoteSync => events.push(SchedulerEvent::SyncRemote { at_ms: at }),
            }
            ledger.roll_period_resets(at);
            self.sync(ledger.state(), at);
            if self.evaluate_auto_mining(ledger, at) {
                events.push(SchedulerEvent::AutoMiningStarted { at_ms: at });
            }
        }
        events
    }

    /// Cancel every task.
    pub fn teardown(&mut self) {
        if !self.armed.is_empty() {
            debug!(tasks = self.armed.len(), "scheduler torn down");
        }
        self.armed.clear();
    }
}
