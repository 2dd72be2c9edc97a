//! Offline catch-up: what a player would have earned while the client was
//! closed, bounded by the offline policy.

use miner_core::config::{EnergyConfig, OfflinePolicy};
use miner_core::{GameState, MS_PER_DAY};

use crate::rates::regen_per_second;

/// Result of a catch-up computation. All fields are zero when nothing accrued.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CatchUp {
    /// Offline window that was credited, after the cap.
    pub elapsed_ms: i64,
    pub earned_points: f64,
    /// Energy regenerated; the caller clamps to capacity.
    pub energy_regen: f64,
    pub efficiency_bonus: f64,
}

impl CatchUp {
    pub fn is_empty(&self) -> bool {
        self.earned_points == 0.0 && self.energy_regen == 0.0
    }
}

/// Compute offline accrual for `snapshot` at `now_ms`.
///
/// Nothing accrues when the clock went backwards or the snapshot was not
/// mining. The window is capped at `policy.cap_days`, and the efficiency bonus
/// grows by `bonus_per_day` up to `max_bonus`.
///
/// Example:
/// 1 h offline at 2 points/s yields `7200 * (1 + 0.1/24)` ≈ 7230 points.
pub fn compute_catch_up(
    snapshot: &GameState,
    now_ms: i64,
    policy: &OfflinePolicy,
    energy: &EnergyConfig,
) -> CatchUp {
    let elapsed = now_ms.saturating_sub(snapshot.last_save_time);
    if elapsed <= 0 || !snapshot.is_mining {
        return CatchUp::default();
    }
    let elapsed = elapsed.min(policy.cap_ms());
    let secs = elapsed as f64 / 1000.0;
    let rate = if snapshot.points_per_second.is_finite() {
        snapshot.points_per_second.max(0.0)
    } else {
        0.0
    };
    let base = rate * secs;
    let days = (elapsed as f64 / MS_PER_DAY as f64).min(policy.cap_days);
    let bonus = (days * policy.bonus_per_day).min(policy.max_bonus);
    CatchUp {
        elapsed_ms: elapsed,
        earned_points: base * (1.0 + bonus),
        energy_regen: regen_per_second(snapshot, energy).max(0.0) * secs,
        efficiency_bonus: bonus,
    }
}

/// Fold a catch-up into a new state.
///
/// Points go to `unclaimed_offline_rewards`, never to `points`. The clock
/// anchor moves to `now_ms`, so applying a fresh computation to the returned
/// state yields nothing.
pub fn apply_catch_up(snapshot: &GameState, catch_up: &CatchUp, now_ms: i64) -> GameState {
    let mut next = snapshot.clone();
    next.last_offline_time = snapshot.last_save_time;
    next.last_save_time = snapshot.last_save_time.max(now_ms);
    next.offline_efficiency_bonus = catch_up.efficiency_bonus;
    if catch_up.earned_points > 0.0 {
        next.unclaimed_offline_rewards += catch_up.earned_points;
        next.last_offline_reward_time = now_ms;
    }
    next.current_energy = (next.current_energy + catch_up.energy_regen).min(next.max_energy);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fresh_state;
    use miner_core::EngineConfig;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn snapshot(pps: f64, offline_ms: i64) -> GameState {
        let mut s = fresh_state(NOW - offline_ms, &EngineConfig::default());
        s.points_per_second = pps;
        s.is_mining = true;
        s
    }

    fn run(s: &GameState, now: i64) -> CatchUp {
        let cfg = EngineConfig::default();
        compute_catch_up(s, now, &cfg.offline, &cfg.energy)
    }

    #[test]
    fn one_hour_example() {
        let c = run(&snapshot(2.0, HOUR), NOW);
        assert_eq!(c.elapsed_ms, HOUR);
        assert!((c.efficiency_bonus - 0.1 / 24.0).abs() < 1e-12);
        assert!((c.earned_points - 7230.0).abs() < 1e-6);
        assert!((c.energy_regen - 0.5 * 3600.0).abs() < 1e-9);
    }

    #[test]
    fn idle_or_backwards_clock_earns_nothing() {
        let mut idle = snapshot(2.0, HOUR);
        idle.is_mining = false;
        assert!(run(&idle, NOW).is_empty());
        assert!(run(&snapshot(2.0, -HOUR), NOW).is_empty());
        assert!(run(&snapshot(2.0, 0), NOW).is_empty());
    }

    #[test]
    fn beyond_cap_equals_cap() {
        let cap = 14 * MS_PER_DAY;
        let pinned = run(&snapshot(1.5, cap), NOW);
        let far = run(&snapshot(1.5, cap * 10), NOW);
        assert_eq!(pinned, far);
        assert!((pinned.efficiency_bonus - 1.4).abs() < 1e-12);
    }

    #[test]
    fn apply_credits_pending_not_points() {
        let s = snapshot(2.0, HOUR);
        let c = run(&s, NOW);
        let next = apply_catch_up(&s, &c, NOW);
        assert_eq!(next.points, s.points);
        assert_eq!(next.total_points_earned, s.total_points_earned);
        assert_eq!(next.unclaimed_offline_rewards, c.earned_points);
        assert_eq!(next.last_save_time, NOW);
        assert_eq!(next.last_offline_time, NOW - HOUR);
        assert_eq!(next.current_energy, next.max_energy);
    }

    #[test]
    fn second_application_adds_nothing() {
        let s = snapshot(2.0, HOUR);
        let once = apply_catch_up(&s, &run(&s, NOW), NOW);
        let again = run(&once, NOW);
        assert!(again.is_empty());
        let twice = apply_catch_up(&once, &again, NOW);
        assert_eq!(twice.unclaimed_offline_rewards, once.unclaimed_offline_rewards);
    }

    #[test]
    fn energy_regen_is_clamped_by_apply() {
        let mut s = snapshot(1.0, HOUR);
        s.current_energy = 10.0;
        let next = apply_catch_up(&s, &run(&s, NOW), NOW);
        assert_eq!(next.current_energy, s.max_energy);
    }

    proptest! {
        #[test]
        fn compute_is_idempotent(pps in 0.0f64..1e6, offline in 0i64..(40 * MS_PER_DAY)) {
            let s = snapshot(pps, offline);
            prop_assert_eq!(run(&s, NOW), run(&s, NOW));
            let c = run(&s, NOW);
            prop_assert!(c.efficiency_bonus <= 1.4 + 1e-12);
            prop_assert!(c.earned_points >= 0.0);
        }
    }
}
