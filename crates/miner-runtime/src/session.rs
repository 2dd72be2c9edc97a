//! A player's live session: the ledger, its scheduler and the save paths.

use std::sync::Arc;

use miner_core::{Boost, GameState, UpgradeId};
use persistence::{LocalStore, PersistenceCoordinator, RemoteStore, Source, StoreError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ledger::{Ledger, Rejection};
use crate::notify::Notifier;
use crate::scheduler::{Scheduler, SchedulerEvent};

pub struct Session<L, R, N> {
    coordinator: Arc<PersistenceCoordinator<L, R>>,
    ledger: Ledger,
    scheduler: Scheduler,
    notifier: N,
    source: Source,
    in_flight: Vec<JoinHandle<()>>,
}

impl<L, R, N> Session<L, R, N>
where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
    N: Notifier,
{
    /// Load (reconcile, catch up, write back) and arm the scheduler.
    pub async fn start(
        coordinator: Arc<PersistenceCoordinator<L, R>>,
        notifier: N,
        now_ms: i64,
    ) -> Self {
        let outcome = coordinator.load(now_ms).await;
        let config = *coordinator.config();
        let mut ledger = Ledger::new(outcome.state, config);
        ledger.roll_period_resets(now_ms);
        if ledger.state().unclaimed_offline_rewards > 0.0 {
            notifier.offline_rewards_available(ledger.state().unclaimed_offline_rewards);
        }
        let mut scheduler = Scheduler::new(config.ticks);
        scheduler.sync(ledger.state(), now_ms);
        scheduler.evaluate_auto_mining(&mut ledger, now_ms);
        info!(
            player = %coordinator.player(),
            source = ?outcome.source,
            mining = ledger.state().is_mining,
            "session started"
        );
        Self {
            coordinator,
            ledger,
            scheduler,
            notifier,
            source: outcome.source,
            in_flight: Vec::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        self.ledger.state()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &PersistenceCoordinator<L, R> {
        &self.coordinator
    }

    /// Where the starting state was loaded from.
    pub fn source(&self) -> Source {
        self.source
    }

    pub fn set_boosts(&mut self, boosts: Vec<Boost>) {
        self.ledger.set_boosts(boosts);
    }

    /// Run every task due by `now_ms` and perform the saves they request.
    ///
    /// Saves happen once, after every due task has run, and carry the
    /// deadline of the last task applied so a reload never catches up over
    /// time the snapshot already counts.
    pub fn advance(&mut self, now_ms: i64) -> Vec<SchedulerEvent> {
        let events = self.scheduler.advance(&mut self.ledger, now_ms);
        let Some(through) = events.iter().map(SchedulerEvent::at_ms).max() else {
            return events;
        };
        let mut save_local = false;
        let mut sync_remote = false;
        for event in &events {
            match event {
                SchedulerEvent::Mined { report, .. } => {
                    if let Some(score) = report.new_high_score {
                        self.notifier.high_score(score);
                    }
                }
                SchedulerEvent::SaveLocal { .. } | SchedulerEvent::MiningHalted { .. } => {
                    save_local = true
                }
                SchedulerEvent::SyncRemote { .. } => sync_remote = true,
                SchedulerEvent::Regenerated { .. } | SchedulerEvent::AutoMiningStarted { .. } => {}
            }
        }
        if save_local {
            let _ = self.save_local(through);
        }
        if sync_remote {
            self.spawn_remote_save(through);
        }
        events
    }

    /// Buy the next level of `id` and save locally right away.
    pub fn purchase(&mut self, id: &str, now_ms: i64) -> Result<u32, Rejection> {
        let level = self.ledger.purchase(id)?;
        self.notifier.upgrade_purchased(&UpgradeId::new(id), level);
        let _ = self.save_local(now_ms);
        self.scheduler.sync(self.ledger.state(), now_ms);
        self.scheduler.evaluate_auto_mining(&mut self.ledger, now_ms);
        Ok(level)
    }

    /// Flip mining by hand and save locally right away.
    pub fn toggle_mining(&mut self, now_ms: i64) -> Result<bool, Rejection> {
        let mining = self.ledger.toggle_mining()?;
        self.scheduler.manual_toggle(mining);
        self.scheduler.sync(self.ledger.state(), now_ms);
        let _ = self.save_local(now_ms);
        Ok(mining)
    }

    /// Claim all pending offline rewards and save locally right away.
    pub fn claim_offline_rewards(&mut self, now_ms: i64) -> f64 {
        let amount = self.ledger.claim_offline_rewards();
        if amount > 0.0 {
            info!(amount, "offline rewards claimed");
            let _ = self.save_local(now_ms);
        }
        amount
    }

    fn save_local(&mut self, now_ms: i64) -> Result<(), StoreError> {
        self.ledger.mark_saved(now_ms);
        self.coordinator.save_local(self.ledger.state())
    }

    fn spawn_remote_save(&mut self, now_ms: i64) {
        self.ledger.mark_saved(now_ms);
        let snapshot = self.ledger.state().clone();
        let coordinator = Arc::clone(&self.coordinator);
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(tokio::spawn(async move {
            // Outcome is logged and flagged by the coordinator.
            let _ = coordinator.save_remote(&snapshot).await;
        }));
    }

    /// Wait for spawned remote saves to finish.
    pub async fn flush(&mut self) {
        for handle in self.in_flight.drain(..) {
            if let Err(e) = handle.await {
                debug!(error = %e, "remote save task ended abnormally");
            }
        }
    }

    /// Cancel every task and write a final snapshot to both stores. Mining is
    /// left as it was so offline catch-up can credit the time away.
    pub async fn shutdown(mut self, now_ms: i64) -> GameState {
        self.scheduler.teardown();
        self.flush().await;
        let _ = self.save_local(now_ms);
        let _ = self.coordinator.save_remote(self.ledger.state()).await;
        info!(player = %self.coordinator.player(), "session closed");
        self.ledger.into_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use miner_core::{EngineConfig, PlayerId};
    use miner_econ::fresh_state;
    use persistence::{MemoryCache, MemoryRemote, Slot, WriteState};

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    type TestCoordinator = PersistenceCoordinator<MemoryCache, MemoryRemote>;

    fn coordinator() -> Arc<TestCoordinator> {
        Arc::new(PersistenceCoordinator::new(
            PlayerId::new("p"),
            MemoryCache::new(),
            MemoryRemote::new(),
            EngineConfig::default(),
        ))
    }

    fn stored_state(c: &TestCoordinator) -> GameState {
        let raw = c
            .local()
            .read(&PlayerId::new("p"), Slot::Primary)
            .unwrap()
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    type TestSession = Session<MemoryCache, MemoryRemote, RecordingNotifier>;

    async fn start(c: &Arc<TestCoordinator>, now: i64) -> TestSession {
        Session::start(Arc::clone(c), RecordingNotifier::default(), now).await
    }

    #[tokio::test]
    async fn fresh_session_mines_and_saves() {
        let c = coordinator();
        let mut session = start(&c, NOW).await;
        assert_eq!(session.source(), Source::Fresh);
        assert_eq!(session.toggle_mining(NOW), Ok(true));
        session.advance(NOW + 30_000);
        session.flush().await;
        assert!((session.state().points - 30.0).abs() < 1e-9);
        assert_eq!(c.status().local(), WriteState::Saved);
        assert_eq!(c.status().remote(), WriteState::Saved);
        assert!(c.remote().get(&PlayerId::new("p")).is_some());
    }

    #[tokio::test]
    async fn offline_time_becomes_claimable() {
        let c = coordinator();
        let mut s = fresh_state(NOW - HOUR, &EngineConfig::default());
        s.points_per_second = 2.0;
        s.is_mining = true;
        c.save_local(&s).unwrap();

        let mut session = start(&c, NOW).await;
        assert_eq!(session.source(), Source::Local);
        assert_eq!(session.notifier.take(), vec!["offline:7230".to_string()]);
        let claimed = session.claim_offline_rewards(NOW);
        assert!((claimed - 7230.0).abs() < 1e-6);
        assert_eq!(session.state().unclaimed_offline_rewards, 0.0);
        assert_eq!(session.claim_offline_rewards(NOW), 0.0);
    }

    #[tokio::test]
    async fn purchase_notifies_and_saves() {
        let c = coordinator();
        let mut session = start(&c, NOW).await;
        assert!(matches!(
            session.purchase("mining-drill", NOW),
            Err(Rejection::InsufficientFunds { .. })
        ));
        session.toggle_mining(NOW).unwrap();
        session.advance(NOW + 25_000);
        let _ = session.notifier.take();
        assert_eq!(session.purchase("mining-drill", NOW + 25_000), Ok(1));
        assert_eq!(
            session.notifier.take(),
            vec!["upgrade:mining-drill:1".to_string()]
        );
        let stored = c
            .local()
            .read(&PlayerId::new("p"), Slot::Primary)
            .unwrap()
            .unwrap();
        assert!(stored.contains("\"upgradesPurchased\":1"));
    }

    #[tokio::test]
    async fn remote_outage_keeps_local_progress() {
        let c = coordinator();
        c.remote().set_offline(true);
        let mut session = start(&c, NOW).await;
        session.toggle_mining(NOW).unwrap();
        session.advance(NOW + 30_000);
        session.flush().await;
        assert_eq!(c.status().remote(), WriteState::Failed);
        assert!((session.state().points - 30.0).abs() < 1e-9);
        let state = session.shutdown(NOW + 30_000).await;
        assert!(state.is_mining);
        let local = c.local().read(&PlayerId::new("p"), Slot::Primary).unwrap();
        assert!(local.is_some());
    }

    #[tokio::test]
    async fn reload_after_crash_does_not_recount_mined_time() {
        let c = coordinator();
        let mut session = start(&c, NOW).await;
        session.toggle_mining(NOW).unwrap();
        session.advance(NOW + 9_000);
        session.flush().await;
        drop(session);

        let stored = stored_state(&c);
        assert_eq!(stored.last_save_time, NOW + 9_000);
        assert!((stored.points - 9.0).abs() < 1e-9);

        let again = start(&c, NOW + 9_000).await;
        assert_eq!(again.state().unclaimed_offline_rewards, 0.0);
        assert!((again.state().points - 9.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn shutdown_then_restart_resumes() {
        let c = coordinator();
        let mut session = start(&c, NOW).await;
        session.toggle_mining(NOW).unwrap();
        session.advance(NOW + 10_000);
        let closed = session.shutdown(NOW + 10_000).await;

        let again = start(&c, NOW + 10_000 + HOUR).await;
        assert_eq!(again.state().points, closed.points);
        assert!(again.state().unclaimed_offline_rewards > 0.0);
        assert!(again.scheduler().is_armed(crate::scheduler::TaskKind::MiningTick));
    }
}
