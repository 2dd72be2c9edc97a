#![deny(warnings)]

//! Core domain models and invariants for Divine Miner.
//!
//! This crate defines the serializable game record shared across the engine,
//! the engine configuration, and the validation guard applied to every
//! snapshot before it is trusted.

pub mod config;
pub mod guard;

pub use config::{ConfigError, EngineConfig};
pub use guard::{inspect, is_valid, sanitize, validate, ValidationError};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot schema version written by this build.
pub const SCHEMA_VERSION: u32 = 3;
/// Base accrual rate of a fresh player.
pub const DEFAULT_POINTS_PER_SECOND: f64 = 1.0;
/// Energy capacity of a fresh player.
pub const DEFAULT_MAX_ENERGY: f64 = 100.0;
/// Experience needed for the first mining level.
pub const DEFAULT_EXPERIENCE_TO_NEXT: f64 = 100.0;
/// Fallback base cost for malformed upgrade definitions.
pub const DEFAULT_BASE_COST: f64 = 25.0;
/// Fallback cost growth for malformed upgrade definitions.
pub const DEFAULT_COST_MULTIPLIER: f64 = 1.12;
/// Upper bound for the per-session mining combo.
pub const MAX_MINING_COMBO: u32 = 100;
pub const MS_PER_DAY: i64 = 86_400_000;
pub const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;

/// Stable player identity used to namespace both stores.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an upgrade, e.g. "mining-drill", "energy-regen-1".
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradeId(pub String);

impl UpgradeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpgradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an upgrade's levels feed into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeCategory {
    /// Raises `points_per_second` by `effect_value` per purchase.
    #[default]
    Production,
    /// Fractional bonus on the effective mining rate.
    Multiplier,
    /// Raises `max_energy` by `effect_value` per level.
    Capacity,
    /// Extra energy regenerated per second.
    Regen,
    /// Fractional discount on the energy cost of a mining tick.
    Efficiency,
    /// Unlocks the auto-mining trigger.
    Automation,
}

/// Single-level prerequisite edge inside the upgrade collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequirement {
    pub upgrade_id: UpgradeId,
    pub level: u32,
}

/// An upgrade definition together with the level the player owns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upgrade {
    pub id: UpgradeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: UpgradeCategory,
    #[serde(default)]
    pub level: u32,
    /// Cost of level 0 (> 0).
    pub base_cost: f64,
    /// Geometric cost growth per level (> 0).
    pub cost_multiplier: f64,
    /// Contribution of a single level.
    #[serde(default)]
    pub effect_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<UpgradeRequirement>,
}

impl Upgrade {
    pub fn is_owned(&self) -> bool {
        self.level > 0
    }

    pub fn is_maxed(&self) -> bool {
        self.max_level.is_some_and(|max| self.level >= max)
    }
}

/// Kind of externally granted boost. Only mining boosts affect the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    Mining,
    #[serde(other)]
    Other,
}

/// Active boost supplied by the boost collaborator; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub multiplier: f64,
}

/// Opaque achievement entry carried through saves untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<i64>,
}

/// Full game record of one player. Timestamps are epoch milliseconds except
/// `last_update`, which is the ISO write stamp used for reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    /// Spendable balance.
    pub points: f64,
    /// Base mining rate before upgrades and boosts.
    pub points_per_second: f64,
    /// Points earned since the last daily reset.
    pub total_earned_24h: f64,
    /// Points earned since the last weekly reset.
    pub total_earned_7d: f64,
    /// Upgrade levels bought over the record's lifetime.
    pub upgrades_purchased: u32,
    /// Whether the mining task runs. Kept across sessions so offline time can earn.
    pub is_mining: bool,
    /// Time through which the record is accounted; offline catch-up starts here.
    pub last_save_time: i64,
    /// Start of the current session.
    pub session_start_time: i64,
    /// Lifetime points earned, including claimed offline rewards.
    pub total_points_earned: f64,
    /// When the 24 h window was last cleared.
    pub last_daily_reset: i64,
    /// When the 7 d window was last cleared.
    pub last_weekly_reset: i64,
    /// Schema version the record was written with.
    pub version: u32,
    /// Highest balance held; never reset.
    pub high_score: f64,
    /// Highest balance ever held; the high-score notification compares against it.
    pub all_time_high_score: f64,
    /// Energy on hand, within `[0, max_energy]`.
    pub current_energy: f64,
    /// Energy capacity: the base plus capacity upgrades.
    pub max_energy: f64,
    /// Time of the last regeneration tick.
    pub last_energy_regen: i64,
    /// Bonus fraction applied by the last offline catch-up.
    pub offline_efficiency_bonus: f64,
    /// Start of the last offline window that was caught up.
    pub last_offline_time: i64,
    /// Offline earnings waiting to be claimed.
    pub unclaimed_offline_rewards: f64,
    /// When offline rewards were last credited as pending.
    pub last_offline_reward_time: i64,
    /// Mining level, starting at 1.
    pub mining_level: u32,
    /// Consecutive mining ticks, capped at [`MAX_MINING_COMBO`].
    pub mining_combo: u32,
    /// Longest combo reached.
    pub mining_streak: u32,
    /// Experience toward the next level.
    pub mining_experience: f64,
    /// Experience needed for the next level; grows 1.5x per level.
    pub mining_experience_to_next: f64,
    /// Upgrade catalog with owned levels.
    pub upgrades: Vec<Upgrade>,
    /// Achievements, carried through saves untouched.
    pub achievements: Vec<Achievement>,
    /// ISO write stamp; the newer stamp wins reconciliation.
    pub last_update: DateTime<Utc>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(0, DEFAULT_MAX_ENERGY, Vec::new())
    }
}

impl GameState {
    /// Fresh record for a new player at `now_ms`, full energy, not mining.
    pub fn new(now_ms: i64, max_energy: f64, upgrades: Vec<Upgrade>) -> Self {
        Self {
            points: 0.0,
            points_per_second: DEFAULT_POINTS_PER_SECOND,
            total_earned_24h: 0.0,
            total_earned_7d: 0.0,
            upgrades_purchased: 0,
            is_mining: false,
            last_save_time: now_ms,
            session_start_time: now_ms,
            total_points_earned: 0.0,
            last_daily_reset: now_ms,
            last_weekly_reset: now_ms,
            version: SCHEMA_VERSION,
            high_score: 0.0,
            all_time_high_score: 0.0,
            current_energy: max_energy,
            max_energy,
            last_energy_regen: now_ms,
            offline_efficiency_bonus: 0.0,
            last_offline_time: now_ms,
            unclaimed_offline_rewards: 0.0,
            last_offline_reward_time: now_ms,
            mining_level: 1,
            mining_combo: 0,
            mining_streak: 0,
            mining_experience: 0.0,
            mining_experience_to_next: DEFAULT_EXPERIENCE_TO_NEXT,
            upgrades,
            achievements: Vec::new(),
            last_update: millis_to_datetime(now_ms),
        }
    }

    pub fn upgrade(&self, id: &str) -> Option<&Upgrade> {
        self.upgrades.iter().find(|u| u.id.as_str() == id)
    }

    pub fn upgrade_mut(&mut self, id: &str) -> Option<&mut Upgrade> {
        self.upgrades.iter_mut().find(|u| u.id.as_str() == id)
    }

    /// Whether energy is below capacity, i.e. regeneration has work to do.
    pub fn needs_regen(&self) -> bool {
        self.current_energy < self.max_energy
    }

    /// Records a successful serialization at `now_ms`.
    pub fn stamp_saved(&mut self, now_ms: i64) {
        self.last_save_time = now_ms;
        self.last_update = millis_to_datetime(now_ms);
        self.version = SCHEMA_VERSION;
    }

    /// Check the invariants every transition must preserve.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        let amounts = [
            ("points", self.points),
            ("pointsPerSecond", self.points_per_second),
            ("totalPointsEarned", self.total_points_earned),
            ("currentEnergy", self.current_energy),
            ("maxEnergy", self.max_energy),
            ("unclaimedOfflineRewards", self.unclaimed_offline_rewards),
            ("highScore", self.high_score),
            ("allTimeHighScore", self.all_time_high_score),
        ];
        for (name, value) in amounts {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite(name.to_string()));
            }
            if value < 0.0 {
                return Err(ValidationError::Negative(name.to_string()));
            }
        }
        if self.max_energy <= 0.0 || self.current_energy > self.max_energy {
            return Err(ValidationError::EnergyOutOfBounds {
                current: self.current_energy,
                max: self.max_energy,
            });
        }
        Ok(())
    }
}

/// Converts epoch milliseconds to a UTC timestamp, falling back to the epoch.
pub fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
