//! Resource ledger: the only place that changes a player's numbers.
//!
//! Every transition is a pure function from a prior state to a new one;
//! [`Ledger`] owns the current state and funnels all writes through `&mut
//! self`, so a tick always reads the state produced by the previous one.

use miner_core::config::EnergyConfig;
use miner_core::{
    Boost, EngineConfig, GameState, UpgradeCategory, MAX_MINING_COMBO, MS_PER_DAY, MS_PER_WEEK,
};
use miner_econ::{
    cost, energy_cost_per_second, is_available, regen_per_second, tick_economy, Modifiers,
};
use thiserror::Error;
use tracing::{debug, info};

/// Why a player action was refused. The prior state is left untouched.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Rejection {
    #[error("insufficient funds: costs {cost}, have {available:.2}")]
    InsufficientFunds { cost: u64, available: f64 },
    #[error("unknown upgrade: {0}")]
    UnknownUpgrade(String),
    #[error("upgrade {0} is at its max level")]
    MaxLevelReached(String),
    #[error("upgrade {upgrade} requires {requires} at level {level}")]
    PrerequisiteNotMet {
        upgrade: String,
        requires: String,
        level: u32,
    },
    #[error("not enough energy to start mining: {current:.2} < {required:.2}")]
    InsufficientEnergy { current: f64, required: f64 },
}

/// Result of one mining tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    pub state: GameState,
    pub credited: f64,
    /// Mining stopped because the tick could not be paid for.
    pub halted: bool,
    pub level_ups: u32,
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn credit(state: &mut GameState, amount: f64) {
    state.points += amount;
    state.total_points_earned += amount;
    state.high_score = state.high_score.max(state.points);
    state.all_time_high_score = state.all_time_high_score.max(state.points);
}

/// Credit `rate * tick_secs` and debit `energy_cost`, or halt mining when the
/// energy on hand cannot pay for the tick.
///
/// Example:
/// with 0.5 energy and a cost of 0.8 the tick halts mining and credits nothing.
pub fn apply_mining_tick(
    state: &GameState,
    rate: f64,
    energy_cost: f64,
    tick_secs: f64,
) -> TickOutcome {
    let mut next = state.clone();
    if !state.is_mining {
        return TickOutcome {
            state: next,
            credited: 0.0,
            halted: false,
            level_ups: 0,
        };
    }
    let energy_cost = non_negative(energy_cost);
    if state.current_energy < energy_cost {
        next.is_mining = false;
        next.mining_combo = 0;
        return TickOutcome {
            state: next,
            credited: 0.0,
            halted: true,
            level_ups: 0,
        };
    }

    let earned = non_negative(rate * tick_secs);
    credit(&mut next, earned);
    next.total_earned_24h += earned;
    next.total_earned_7d += earned;
    next.current_energy = (next.current_energy - energy_cost).clamp(0.0, next.max_energy);

    next.mining_combo = (next.mining_combo + 1).min(MAX_MINING_COMBO);
    next.mining_streak = next.mining_streak.max(next.mining_combo);
    next.mining_experience += earned;
    let mut level_ups = 0;
    while next.mining_experience >= next.mining_experience_to_next {
        next.mining_experience -= next.mining_experience_to_next;
        next.mining_experience_to_next *= 1.5;
        next.mining_level = next.mining_level.saturating_add(1);
        level_ups += 1;
    }

    TickOutcome {
        state: next,
        credited: earned,
        halted: false,
        level_ups,
    }
}

/// Add `regen_per_second * tick_secs` energy, clamped to capacity.
pub fn apply_energy_regen(state: &GameState, regen_per_second: f64, tick_secs: f64) -> GameState {
    let mut next = state.clone();
    let gained = non_negative(regen_per_second * tick_secs);
    next.current_energy = (next.current_energy + gained).clamp(0.0, next.max_energy);
    next
}

/// Buy the next level of `id`.
///
/// Production upgrades raise `points_per_second` by their effect; capacity
/// upgrades recompute `max_energy` and scale current energy to keep the same
/// fill ratio.
pub fn purchase_upgrade(
    state: &GameState,
    id: &str,
    energy: &EnergyConfig,
) -> Result<GameState, Rejection> {
    let upgrade = state
        .upgrade(id)
        .ok_or_else(|| Rejection::UnknownUpgrade(id.to_string()))?;
    if upgrade.is_maxed() || upgrade.level == u32::MAX {
        return Err(Rejection::MaxLevelReached(id.to_string()));
    }
    if !is_available(upgrade, &state.upgrades) {
        let (requires, level) = upgrade
            .requires
            .as_ref()
            .map(|r| (r.upgrade_id.to_string(), r.level))
            .unwrap_or_default();
        return Err(Rejection::PrerequisiteNotMet {
            upgrade: id.to_string(),
            requires,
            level,
        });
    }
    let price = cost(upgrade);
    if state.points < price as f64 {
        return Err(Rejection::InsufficientFunds {
            cost: price,
            available: state.points,
        });
    }

    let category = upgrade.category;
    let effect = non_negative(upgrade.effect_value);
    let mut next = state.clone();
    next.points -= price as f64;
    next.upgrades_purchased = next.upgrades_purchased.saturating_add(1);
    if let Some(u) = next.upgrade_mut(id) {
        u.level = u.level.saturating_add(1);
    }
    match category {
        UpgradeCategory::Production => next.points_per_second += effect,
        UpgradeCategory::Capacity => {
            let ratio = if next.max_energy > 0.0 {
                next.current_energy / next.max_energy
            } else {
                1.0
            };
            let capacity =
                energy.base_max_energy + Modifiers::from_upgrades(&next.upgrades).capacity_bonus;
            next.max_energy = capacity;
            next.current_energy = (ratio * capacity).clamp(0.0, capacity);
        }
        _ => {}
    }
    Ok(next)
}

/// Start or stop mining. Starting needs at least `min_energy_to_start`.
pub fn toggle_mining(state: &GameState, energy: &EnergyConfig) -> Result<GameState, Rejection> {
    let mut next = state.clone();
    if state.is_mining {
        next.is_mining = false;
        next.mining_combo = 0;
        return Ok(next);
    }
    if state.current_energy < energy.min_energy_to_start {
        return Err(Rejection::InsufficientEnergy {
            current: state.current_energy,
            required: energy.min_energy_to_start,
        });
    }
    next.is_mining = true;
    Ok(next)
}

/// Move all pending offline rewards into points in one step. Returns the new
/// state and the amount claimed.
pub fn claim_offline_rewards(state: &GameState) -> (GameState, f64) {
    let amount = non_negative(state.unclaimed_offline_rewards);
    let mut next = state.clone();
    next.unclaimed_offline_rewards = 0.0;
    credit(&mut next, amount);
    (next, amount)
}

/// Clear the rolling 24 h and 7 d windows once their period has elapsed.
/// High scores are never reset.
pub fn roll_period_resets(state: &GameState, now_ms: i64) -> GameState {
    let mut next = state.clone();
    if now_ms.saturating_sub(next.last_daily_reset) >= MS_PER_DAY {
        next.total_earned_24h = 0.0;
        next.last_daily_reset = now_ms;
    }
    if now_ms.saturating_sub(next.last_weekly_reset) >= MS_PER_WEEK {
        next.total_earned_7d = 0.0;
        next.last_weekly_reset = now_ms;
    }
    next
}

/// What a mining tick did, as seen by the scheduler and session.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub credited: f64,
    pub energy_spent: f64,
    pub halted: bool,
    pub level_ups: u32,
    /// Set on the first tick of a session that beats the standing all-time
    /// high score.
    pub new_high_score: Option<f64>,
}

/// Single owner of the live state.
#[derive(Clone, Debug)]
pub struct Ledger {
    state: GameState,
    boosts: Vec<Boost>,
    config: EngineConfig,
    high_score_to_beat: Option<f64>,
}

impl Ledger {
    pub fn new(state: GameState, config: EngineConfig) -> Self {
        let high_score_to_beat = Some(state.all_time_high_score);
        Self {
            state,
            boosts: Vec::new(),
            config,
            high_score_to_beat,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn boosts(&self) -> &[Boost] {
        &self.boosts
    }

    /// Replace the active boosts. They take effect on the next tick.
    pub fn set_boosts(&mut self, boosts: Vec<Boost>) {
        self.boosts = boosts;
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    fn tick_secs(ms: u64) -> f64 {
        ms as f64 / 1000.0
    }

    /// Run one mining tick with the rate and cost derived from the current
    /// state and boosts.
    pub fn mining_tick(&mut self) -> TickReport {
        let secs = Self::tick_secs(self.config.ticks.mining_ms);
        let economy = tick_economy(&self.state, &self.boosts, &self.config.energy, secs);
        let before = self.state.current_energy;
        let outcome =
            apply_mining_tick(&self.state, economy.rate_per_second, economy.energy_cost, secs);
        self.state = outcome.state;
        if outcome.halted {
            info!(energy = before, cost = economy.energy_cost, "mining halted: out of energy");
        }
        if outcome.level_ups > 0 {
            debug!(level = self.state.mining_level, "mining level up");
        }
        let new_high_score = match self.high_score_to_beat {
            Some(standing)
                if outcome.credited > 0.0 && self.state.all_time_high_score > standing =>
            {
                self.high_score_to_beat = None;
                Some(self.state.all_time_high_score)
            }
            _ => None,
        };
        TickReport {
            credited: outcome.credited,
            energy_spent: before - self.state.current_energy,
            halted: outcome.halted,
            level_ups: outcome.level_ups,
            new_high_score,
        }
    }

    /// Regenerate one regen period of energy at `now_ms`.
    pub fn regen_tick(&mut self, now_ms: i64) {
        let secs = Self::tick_secs(self.config.ticks.regen_ms);
        let regen = regen_per_second(&self.state, &self.config.energy);
        self.state = apply_energy_regen(&self.state, regen, secs);
        self.state.last_energy_regen = now_ms;
    }

    /// Buy the next level of `id`; returns the new level.
    pub fn purchase(&mut self, id: &str) -> Result<u32, Rejection> {
        let next = purchase_upgrade(&self.state, id, &self.config.energy)?;
        self.state = next;
        let level = self.state.upgrade(id).map(|u| u.level).unwrap_or_default();
        info!(upgrade = id, level, points = self.state.points, "upgrade bought");
        Ok(level)
    }

    /// Flip mining; returns whether mining is now on.
    pub fn toggle_mining(&mut self) -> Result<bool, Rejection> {
        self.state = toggle_mining(&self.state, &self.config.energy)?;
        Ok(self.state.is_mining)
    }

    pub fn claim_offline_rewards(&mut self) -> f64 {
        let (next, amount) = claim_offline_rewards(&self.state);
        self.state = next;
        amount
    }

    pub fn roll_period_resets(&mut self, now_ms: i64) {
        self.state = roll_period_resets(&self.state, now_ms);
    }

    /// Whether automation should start mining now: not mining, an automation
    /// upgrade is owned, and energy covers the configured headroom of the
    /// projected cost.
    pub fn auto_mining_ready(&self) -> bool {
        let s = &self.state;
        if s.is_mining || !Modifiers::from_upgrades(&s.upgrades).automation {
            return false;
        }
        let per_second = energy_cost_per_second(s, &self.boosts, &self.config.energy);
        let auto = &self.config.auto_mining;
        let needed = per_second * auto.headroom_seconds * auto.headroom_factor;
        s.current_energy >= needed.max(self.config.energy.min_energy_to_start)
    }

    /// Record a serialization at `now_ms` so the write carries a fresh stamp.
    pub fn mark_saved(&mut self, now_ms: i64) {
        self.state.stamp_saved(now_ms);
    }
}
