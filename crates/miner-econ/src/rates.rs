//! Effective mining rate and energy cost, recomputed from the current state on
//! every tick.
//!
//! Neither value is stored: both follow from `points_per_second`, the active
//! boosts and the owned upgrade aggregates at the moment a tick fires.

use miner_core::config::EnergyConfig;
use miner_core::{Boost, BoostKind, GameState};

use crate::registry::Modifiers;

/// Rate and cost of a single mining tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickEconomy {
    /// Points per second after multipliers and boosts.
    pub rate_per_second: f64,
    /// Energy debited by one tick.
    pub energy_cost: f64,
    /// Clamped rate-to-cost multiplier.
    pub speed_multiplier: f64,
    /// Efficiency multiplier on energy cost, never below the configured floor.
    pub cost_multiplier: f64,
}

/// Product of active mining boost multipliers. Non-finite or non-positive
/// multipliers are ignored.
pub fn boost_factor(boosts: &[Boost]) -> f64 {
    boosts
        .iter()
        .filter(|b| b.kind == BoostKind::Mining)
        .map(|b| b.multiplier)
        .filter(|m| m.is_finite() && *m > 0.0)
        .product()
}

fn rate_factor(modifiers: &Modifiers, boosts: &[Boost]) -> f64 {
    let bonus = if modifiers.rate_bonus.is_finite() {
        modifiers.rate_bonus.max(0.0)
    } else {
        0.0
    };
    (1.0 + bonus) * boost_factor(boosts)
}

/// Points per second after upgrade multipliers and boosts.
pub fn effective_rate(state: &GameState, boosts: &[Boost]) -> f64 {
    let base = if state.points_per_second.is_finite() {
        state.points_per_second.max(0.0)
    } else {
        0.0
    };
    base * rate_factor(&Modifiers::from_upgrades(&state.upgrades), boosts)
}

fn speed_multiplier(modifiers: &Modifiers, boosts: &[Boost], cfg: &EnergyConfig) -> f64 {
    rate_factor(modifiers, boosts).clamp(cfg.min_speed_multiplier, cfg.max_speed_multiplier)
}

fn cost_multiplier(modifiers: &Modifiers, cfg: &EnergyConfig) -> f64 {
    (1.0 - modifiers.energy_cost_discount).max(cfg.min_cost_multiplier)
}

/// Energy per second of mining at the current state.
pub fn energy_cost_per_second(state: &GameState, boosts: &[Boost], cfg: &EnergyConfig) -> f64 {
    let modifiers = Modifiers::from_upgrades(&state.upgrades);
    cfg.base_cost_per_second
        * speed_multiplier(&modifiers, boosts, cfg)
        * cost_multiplier(&modifiers, cfg)
}

/// Energy regenerated per second: base plus regen upgrades.
pub fn regen_per_second(state: &GameState, cfg: &EnergyConfig) -> f64 {
    cfg.base_regen_per_second + Modifiers::from_upgrades(&state.upgrades).regen_bonus
}

/// Rate and cost for a tick of `tick_secs` seconds.
///
/// The speed multiplier is derived from the multiplier and boost factors
/// directly rather than by dividing the boosted rate by the base rate, so a
/// change to `points_per_second` never moves the energy cost.
pub fn tick_economy(
    state: &GameState,
    boosts: &[Boost],
    cfg: &EnergyConfig,
    tick_secs: f64,
) -> TickEconomy {
    let modifiers = Modifiers::from_upgrades(&state.upgrades);
    let speed = speed_multiplier(&modifiers, boosts, cfg);
    let cost_mult = cost_multiplier(&modifiers, cfg);
    TickEconomy {
        rate_per_second: effective_rate(state, boosts),
        energy_cost: cfg.base_cost_per_second * tick_secs * speed * cost_mult,
        speed_multiplier: speed,
        cost_multiplier: cost_mult,
    }
}
