//! Engine configuration loaded from YAML.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DEFAULT_MAX_ENERGY;

/// Errors raised while loading or checking an [`EngineConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config value: {0}")]
    Invalid(&'static str),
}

/// Periods of the scheduler's named tasks, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickPeriods {
    pub mining_ms: u64,
    pub regen_ms: u64,
    pub local_save_ms: u64,
    pub remote_sync_ms: u64,
}

impl Default for TickPeriods {
    fn default() -> Self {
        Self {
            mining_ms: 500,
            regen_ms: 1_000,
            local_save_ms: 5_000,
            remote_sync_ms: 30_000,
        }
    }
}

/// Energy economy constants.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub base_max_energy: f64,
    pub base_regen_per_second: f64,
    /// Energy spent per second of mining before multipliers.
    pub base_cost_per_second: f64,
    /// Floor of the efficiency multiplier on energy cost.
    pub min_cost_multiplier: f64,
    pub min_speed_multiplier: f64,
    pub max_speed_multiplier: f64,
    /// Energy required to start mining by hand.
    pub min_energy_to_start: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            base_max_energy: DEFAULT_MAX_ENERGY,
            base_regen_per_second: 0.5,
            base_cost_per_second: 1.0,
            min_cost_multiplier: 0.05,
            min_speed_multiplier: 0.5,
            max_speed_multiplier: 2.0,
            min_energy_to_start: 1.0,
        }
    }
}

/// Offline catch-up policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflinePolicy {
    pub cap_days: f64,
    pub bonus_per_day: f64,
    pub max_bonus: f64,
}

impl Default for OfflinePolicy {
    fn default() -> Self {
        Self {
            cap_days: 14.0,
            bonus_per_day: 0.10,
            max_bonus: 1.40,
        }
    }
}

impl OfflinePolicy {
    /// Longest offline window that still earns, in milliseconds.
    pub fn cap_ms(&self) -> i64 {
        (self.cap_days * crate::MS_PER_DAY as f64) as i64
    }
}

/// Auto-mining trigger threshold: energy must cover `headroom_seconds` of
/// projected cost, `headroom_factor` times over.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMiningConfig {
    pub headroom_seconds: f64,
    pub headroom_factor: f64,
}

impl Default for AutoMiningConfig {
    fn default() -> Self {
        Self {
            headroom_seconds: 5.0,
            headroom_factor: 2.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ticks: TickPeriods,
    pub energy: EnergyConfig,
    pub offline: OfflinePolicy,
    pub auto_mining: AutoMiningConfig,
}

impl EngineConfig {
    /// Parse and validate a YAML document; missing keys take defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.ticks;
        if t.mining_ms == 0 || t.regen_ms == 0 || t.local_save_ms == 0 || t.remote_sync_ms == 0 {
            return Err(ConfigError::Invalid("tick periods must be > 0"));
        }
        let e = &self.energy;
        let finite = [
            e.base_max_energy,
            e.base_regen_per_second,
            e.base_cost_per_second,
            e.min_cost_multiplier,
            e.min_speed_multiplier,
            e.max_speed_multiplier,
            e.min_energy_to_start,
            self.offline.cap_days,
            self.offline.bonus_per_day,
            self.offline.max_bonus,
            self.auto_mining.headroom_seconds,
            self.auto_mining.headroom_factor,
        ];
        if finite.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid("values must be finite and >= 0"));
        }
        if e.base_max_energy <= 0.0 {
            return Err(ConfigError::Invalid("base_max_energy must be > 0"));
        }
        if !(0.0..=1.0).contains(&e.min_cost_multiplier) {
            return Err(ConfigError::Invalid("min_cost_multiplier must be within [0,1]"));
        }
        if e.min_speed_multiplier > e.max_speed_multiplier {
            return Err(ConfigError::Invalid("speed multiplier bounds are inverted"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadences() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ticks.mining_ms, 500);
        assert_eq!(cfg.ticks.regen_ms, 1_000);
        assert_eq!(cfg.ticks.local_save_ms, 5_000);
        assert_eq!(cfg.ticks.remote_sync_ms, 30_000);
        assert_eq!(cfg.offline.cap_ms(), 14 * 86_400_000);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = EngineConfig::from_yaml_str("energy:\n  base_regen_per_second: 2.0\n").unwrap();
        assert_eq!(cfg.energy.base_regen_per_second, 2.0);
        assert_eq!(cfg.energy.base_cost_per_second, 1.0);
        assert_eq!(cfg.ticks, TickPeriods::default());
    }

    #[test]
    fn rejects_zero_period() {
        let err = EngineConfig::from_yaml_str("ticks:\n  mining_ms: 0\n").unwrap_err();
        assert_eq!(err, ConfigError::Invalid("tick periods must be > 0"));
    }

    #[test]
    fn shipped_sample_matches_defaults() {
        let text = include_str!("../../../assets/config/engine.yaml");
        assert_eq!(EngineConfig::from_yaml_str(text).unwrap(), EngineConfig::default());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            EngineConfig::from_yaml_str("ticks: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}
