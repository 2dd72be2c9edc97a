//! Versioned snapshot schema with a single migrate-on-load step.
//!
//! Changelog:
//! - v1: points, rates, counters and timestamps only
//! - v2: energy (`currentEnergy`, `maxEnergy`, `lastEnergyRegen`)
//! - v3: mining progression and offline reward bookkeeping

use miner_core::{
    inspect, millis_to_datetime, GameState, ValidationError, DEFAULT_EXPERIENCE_TO_NEXT,
    DEFAULT_MAX_ENERGY, SCHEMA_VERSION,
};
use miner_econ::merge_catalog;
use serde_json::{Map, Value};
use tracing::debug;

use crate::StoreError;

fn fill(obj: &mut Map<String, Value>, key: &str, value: Value) {
    obj.entry(key).or_insert(value);
}

/// Bring a raw snapshot up to [`SCHEMA_VERSION`], filling the fields each
/// version introduced. Snapshots without a version are treated as v1;
/// snapshots from a newer build are rejected.
pub fn migrate(candidate: Value) -> Result<Value, ValidationError> {
    let mut obj = match candidate {
        Value::Object(obj) => obj,
        _ => return Err(ValidationError::NotAnObject),
    };
    let version = match obj.get("version") {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ValidationError::WrongType("version".into()))?,
    };
    if version > SCHEMA_VERSION {
        return Err(ValidationError::UnsupportedVersion(version));
    }
    let anchor = obj.get("lastSaveTime").cloned().unwrap_or(Value::Null);

    if version < 2 {
        fill(&mut obj, "maxEnergy", Value::from(DEFAULT_MAX_ENERGY));
        fill(&mut obj, "currentEnergy", Value::from(DEFAULT_MAX_ENERGY));
        fill(&mut obj, "lastEnergyRegen", anchor.clone());
    }
    if version < 3 {
        fill(&mut obj, "miningLevel", Value::from(1u32));
        fill(&mut obj, "miningCombo", Value::from(0u32));
        fill(&mut obj, "miningStreak", Value::from(0u32));
        fill(&mut obj, "miningExperience", Value::from(0.0));
        fill(&mut obj, "miningExperienceToNext", Value::from(DEFAULT_EXPERIENCE_TO_NEXT));
        fill(&mut obj, "unclaimedOfflineRewards", Value::from(0.0));
        fill(&mut obj, "offlineEfficiencyBonus", Value::from(0.0));
        fill(&mut obj, "lastOfflineTime", anchor.clone());
        fill(&mut obj, "lastOfflineRewardTime", anchor.clone());
    }
    if !obj.contains_key("lastUpdate") {
        if let Some(ms) = anchor.as_f64().filter(|v| v.is_finite()) {
            let stamp = millis_to_datetime(ms as i64).to_rfc3339();
            obj.insert("lastUpdate".into(), Value::String(stamp));
        }
    }
    if version < SCHEMA_VERSION {
        debug!(from = version, to = SCHEMA_VERSION, "migrated snapshot");
    }
    obj.insert("version".into(), Value::from(SCHEMA_VERSION));
    Ok(Value::Object(obj))
}

/// Parse, migrate, guard and decode a stored payload.
pub fn decode(raw: &str, now_ms: i64) -> Result<GameState, ValidationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    let mut state = inspect(migrate(value)?, now_ms)?;
    state.upgrades = merge_catalog(&state.upgrades);
    Ok(state)
}

/// Serialize a state for either store.
pub fn encode(state: &GameState) -> Result<String, StoreError> {
    Ok(serde_json::to_string(state)?)
}
