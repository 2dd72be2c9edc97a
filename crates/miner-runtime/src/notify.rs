//! Outbound player notifications. Delivery is fire-and-forget.

use miner_core::UpgradeId;
use tracing::info;

pub trait Notifier: Send + Sync {
    fn upgrade_purchased(&self, id: &UpgradeId, new_level: u32);
    fn high_score(&self, score: f64);
    fn offline_rewards_available(&self, amount: f64);
}

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn upgrade_purchased(&self, id: &UpgradeId, new_level: u32) {
        info!(upgrade = %id, level = new_level, "upgrade purchased");
    }

    fn high_score(&self, score: f64) {
        info!(score, "new high score");
    }

    fn offline_rewards_available(&self, amount: f64) {
        info!(amount, "offline rewards available");
    }
}

/// Collects notifications in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub events: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn upgrade_purchased(&self, id: &UpgradeId, new_level: u32) {
        self.push(format!("upgrade:{id}:{new_level}"));
    }

    fn high_score(&self, _score: f64) {
        self.push("high_score".into());
    }

    fn offline_rewards_available(&self, amount: f64) {
        self.push(format!("offline:{}", amount.round()));
    }
}
