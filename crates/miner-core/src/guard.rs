//! Validation guard shared by every snapshot load path.
//!
//! Candidates are inspected as raw JSON trees so that absent fields, `null`
//! placeholders (serializers write NaN and Infinity as `null`) and wrong types
//! can be told apart before anything is decoded. Repair is lenient: broken
//! numbers get documented defaults and negative counters clamp to zero, while
//! a missing or mistyped required field rejects the candidate.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::{
    GameState, DEFAULT_BASE_COST, DEFAULT_COST_MULTIPLIER, DEFAULT_EXPERIENCE_TO_NEXT,
    DEFAULT_MAX_ENERGY, DEFAULT_POINTS_PER_SECOND, MS_PER_DAY,
};

/// Reasons a snapshot candidate is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("snapshot root must be an object")]
    NotAnObject,
    #[error("required field missing: {0}")]
    MissingField(String),
    #[error("wrong type for field: {0}")]
    WrongType(String),
    #[error("non-finite numeric value in {0}")]
    NonFinite(String),
    #[error("negative value in {0}")]
    Negative(String),
    #[error("energy {current} outside [0, {max}]")]
    EnergyOutOfBounds { current: f64, max: f64 },
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
}

/// Numeric fields that must be present for a candidate to be usable.
pub const REQUIRED_NUMERIC: [&str; 6] = [
    "points",
    "pointsPerSecond",
    "totalPointsEarned",
    "currentEnergy",
    "maxEnergy",
    "lastSaveTime",
];

#[derive(Clone, Copy, Debug)]
enum Repair {
    /// Non-finite takes the default; the sign is left to validation.
    Amount(f64),
    /// Non-finite or non-positive takes the default.
    Positive(f64),
    /// Non-finite takes the default; negative clamps to zero.
    Counter(f64),
    /// Integer count: non-finite takes the default, negative clamps to zero,
    /// fractions are floored.
    Count(u32),
    /// Epoch milliseconds: non-finite, negative or far-future values become
    /// the load time.
    Timestamp,
}

/// How far past the load time a stored timestamp may lie before it is
/// treated as broken.
pub const MAX_CLOCK_SKEW_MS: i64 = MS_PER_DAY;

fn plausible_timestamp(v: f64, now_ms: i64) -> bool {
    v >= 0.0 && v <= now_ms.saturating_add(MAX_CLOCK_SKEW_MS) as f64
}

const STATE_FIELDS: &[(&str, Repair)] = &[
    ("points", Repair::Amount(0.0)),
    ("pointsPerSecond", Repair::Amount(DEFAULT_POINTS_PER_SECOND)),
    ("maxEnergy", Repair::Positive(DEFAULT_MAX_ENERGY)),
    ("currentEnergy", Repair::Counter(DEFAULT_MAX_ENERGY)),
    ("miningExperienceToNext", Repair::Positive(DEFAULT_EXPERIENCE_TO_NEXT)),
    ("totalPointsEarned", Repair::Counter(0.0)),
    ("totalEarned24h", Repair::Counter(0.0)),
    ("totalEarned7d", Repair::Counter(0.0)),
    ("highScore", Repair::Counter(0.0)),
    ("allTimeHighScore", Repair::Counter(0.0)),
    ("unclaimedOfflineRewards", Repair::Counter(0.0)),
    ("offlineEfficiencyBonus", Repair::Counter(0.0)),
    ("miningExperience", Repair::Counter(0.0)),
    ("upgradesPurchased", Repair::Count(0)),
    ("miningLevel", Repair::Count(1)),
    ("miningCombo", Repair::Count(0)),
    ("miningStreak", Repair::Count(0)),
    ("lastSaveTime", Repair::Timestamp),
    ("sessionStartTime", Repair::Timestamp),
    ("lastDailyReset", Repair::Timestamp),
    ("lastWeeklyReset", Repair::Timestamp),
    ("lastEnergyRegen", Repair::Timestamp),
    ("lastOfflineTime", Repair::Timestamp),
    ("lastOfflineRewardTime", Repair::Timestamp),
];

const UPGRADE_FIELDS: &[(&str, Repair)] = &[
    ("level", Repair::Count(0)),
    ("baseCost", Repair::Positive(DEFAULT_BASE_COST)),
    ("costMultiplier", Repair::Positive(DEFAULT_COST_MULTIPLIER)),
    ("effectValue", Repair::Amount(0.0)),
];

/// Returns true when the slot was rewritten.
fn repair(slot: &mut Value, rule: Repair, now_ms: i64) -> bool {
    let current = slot.as_f64().filter(|v| v.is_finite());
    let fixed = match (rule, current) {
        (Repair::Amount(default), None) => Value::from(default),
        (Repair::Amount(_), Some(_)) => return false,
        (Repair::Positive(_), Some(v)) if v > 0.0 => return false,
        (Repair::Positive(default), _) => Value::from(default),
        (Repair::Counter(default), None) => Value::from(default),
        (Repair::Counter(_), Some(v)) if v < 0.0 => Value::from(0.0),
        (Repair::Counter(_), Some(_)) => return false,
        (Repair::Count(default), None) => Value::from(default),
        (Repair::Count(_), Some(v)) if v < 0.0 => Value::from(0u32),
        (Repair::Count(_), Some(v)) if slot.is_u64() && v <= u32::MAX as f64 => return false,
        (Repair::Count(_), Some(v)) => Value::from(v.floor().min(u32::MAX as f64) as u32),
        (Repair::Timestamp, Some(v)) if plausible_timestamp(v, now_ms) && slot.is_i64() => {
            return false
        }
        (Repair::Timestamp, Some(v)) if plausible_timestamp(v, now_ms) => {
            Value::from(v.trunc() as i64)
        }
        (Repair::Timestamp, _) => Value::from(now_ms),
    };
    *slot = fixed;
    true
}

fn repair_fields(
    obj: &mut Map<String, Value>,
    fields: &[(&str, Repair)],
    fill_missing: bool,
    now_ms: i64,
) -> usize {
    let mut repaired = 0;
    for &(name, rule) in fields {
        if fill_missing {
            obj.entry(name).or_insert(Value::Null);
        }
        let Some(slot) = obj.get_mut(name) else {
            continue;
        };
        // A required field of the wrong type is left for validation to reject.
        let repairable = slot.is_null() || slot.is_number() || !REQUIRED_NUMERIC.contains(&name);
        if repairable && repair(slot, rule, now_ms) {
            repaired += 1;
        }
    }
    repaired
}

fn sanitize_upgrade(upgrade: &mut Map<String, Value>, now_ms: i64) -> usize {
    let mut repaired = repair_fields(upgrade, UPGRADE_FIELDS, true, now_ms);
    if let Some(max) = upgrade.get_mut("maxLevel") {
        if !max.is_null() {
            match max.as_f64().filter(|v| v.is_finite() && *v >= 0.0) {
                Some(_) if max.is_u64() => {}
                Some(v) => {
                    *max = Value::from(v.floor().min(u32::MAX as f64) as u32);
                    repaired += 1;
                }
                None => {
                    *max = Value::Null;
                    repaired += 1;
                }
            }
        }
    }
    if let Some(req) = upgrade.get_mut("requires") {
        let usable = req
            .as_object()
            .is_some_and(|r| r.get("upgradeId").is_some_and(Value::is_string));
        if usable {
            if let Some(r) = req.as_object_mut() {
                repaired += repair_fields(r, &[("level", Repair::Count(0))], true, now_ms);
            }
        } else if !req.is_null() {
            *req = Value::Null;
            repaired += 1;
        }
    }
    repaired
}

/// Repair a candidate in place of rejecting it where possible.
///
/// Every numeric field that is `null` or non-finite, at the top level and
/// inside the upgrade list, takes its documented default; negative cumulative
/// counters clamp to zero; broken timestamps become `now_ms` so they cannot
/// open an offline window; energy is clamped into `[0, maxEnergy]`. Missing
/// required fields are left missing for [`validate`] to reject.
pub fn sanitize(candidate: Value, now_ms: i64) -> Value {
    let mut obj = match candidate {
        Value::Object(obj) => obj,
        other => return other,
    };
    let mut repaired = repair_fields(&mut obj, STATE_FIELDS, false, now_ms);

    let max = obj.get("maxEnergy").and_then(Value::as_f64);
    if let (Some(max), Some(slot)) = (max, obj.get_mut("currentEnergy")) {
        if slot.as_f64().is_some_and(|current| current > max) {
            *slot = Value::from(max);
            repaired += 1;
        }
    }

    if let Some(Value::Array(upgrades)) = obj.get_mut("upgrades") {
        let before = upgrades.len();
        upgrades.retain(|u| u.get("id").is_some_and(Value::is_string));
        repaired += before - upgrades.len();
        for upgrade in upgrades.iter_mut() {
            if let Some(u) = upgrade.as_object_mut() {
                repaired += sanitize_upgrade(u, now_ms);
            }
        }
    }

    if repaired > 0 {
        debug!(repaired, "sanitized snapshot fields");
    }
    Value::Object(obj)
}

fn required_number(obj: &Map<String, Value>, name: &str) -> Result<f64, ValidationError> {
    match obj.get(name) {
        None => Err(ValidationError::MissingField(name.to_string())),
        Some(Value::Null) => Err(ValidationError::NonFinite(name.to_string())),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::NonFinite(name.to_string())),
        Some(_) => Err(ValidationError::WrongType(name.to_string())),
    }
}

/// Check a candidate against the snapshot schema.
///
/// Requires every field in [`REQUIRED_NUMERIC`] to be a finite number,
/// `isMining` to be a boolean, `points`/`pointsPerSecond` to be non-negative,
/// `maxEnergy` to be positive and `upgrades`, when present, to be a list.
pub fn validate(candidate: &Value) -> Result<(), ValidationError> {
    let obj = candidate.as_object().ok_or(ValidationError::NotAnObject)?;
    for name in REQUIRED_NUMERIC {
        required_number(obj, name)?;
    }
    match obj.get("isMining") {
        Some(Value::Bool(_)) => {}
        None => return Err(ValidationError::MissingField("isMining".into())),
        Some(_) => return Err(ValidationError::WrongType("isMining".into())),
    }
    for name in ["points", "pointsPerSecond"] {
        if required_number(obj, name)? < 0.0 {
            return Err(ValidationError::Negative(name.to_string()));
        }
    }
    if required_number(obj, "maxEnergy")? <= 0.0 {
        return Err(ValidationError::Negative("maxEnergy".into()));
    }
    if let Some(upgrades) = obj.get("upgrades") {
        if !upgrades.is_array() {
            return Err(ValidationError::WrongType("upgrades".into()));
        }
    }
    Ok(())
}

/// Predicate form of [`validate`].
pub fn is_valid(candidate: &Value) -> bool {
    validate(candidate).is_ok()
}

/// Sanitize, validate and decode a candidate into a usable [`GameState`].
pub fn inspect(candidate: Value, now_ms: i64) -> Result<GameState, ValidationError> {
    let repaired = sanitize(candidate, now_ms);
    validate(&repaired)?;
    let mut state: GameState =
        serde_json::from_value(repaired).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    state.high_score = state.high_score.max(state.points);
    state.all_time_high_score = state.all_time_high_score.max(state.high_score);
    state.check_invariants()?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Upgrade, UpgradeCategory, UpgradeId};
    use proptest::prelude::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn snapshot() -> Value {
        let mut state = GameState::new(NOW - 60_000, DEFAULT_MAX_ENERGY, vec![]);
        state.upgrades.push(Upgrade {
            id: UpgradeId::new("energy-regen-1"),
            name: "Regen".into(),
            category: UpgradeCategory::Regen,
            level: 3,
            base_cost: 40.0,
            cost_multiplier: 1.15,
            effect_value: 0.25,
            max_level: Some(10),
            requires: None,
        });
        serde_json::to_value(&state).unwrap()
    }

    #[test]
    fn fresh_snapshot_is_valid() {
        let v = snapshot();
        assert!(is_valid(&v));
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.upgrades.len(), 1);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut v = snapshot();
        v.as_object_mut().unwrap().remove("points");
        assert_eq!(
            inspect(v, NOW).unwrap_err(),
            ValidationError::MissingField("points".into())
        );
    }

    #[test]
    fn mistyped_required_field_is_rejected() {
        let mut v = snapshot();
        v["points"] = json!("lots");
        assert_eq!(validate(&v), Err(ValidationError::WrongType("points".into())));
        assert!(inspect(v, NOW).is_err());
    }

    #[test]
    fn missing_mining_flag_is_rejected() {
        let mut v = snapshot();
        v.as_object_mut().unwrap().remove("isMining");
        assert_eq!(
            inspect(v, NOW).unwrap_err(),
            ValidationError::MissingField("isMining".into())
        );
    }

    #[test]
    fn negative_points_are_rejected_not_repaired() {
        let mut v = snapshot();
        v["points"] = json!(-5.0);
        assert_eq!(
            inspect(v, NOW).unwrap_err(),
            ValidationError::Negative("points".into())
        );
    }

    #[test]
    fn non_finite_values_take_defaults() {
        let mut state = GameState::new(NOW, DEFAULT_MAX_ENERGY, vec![]);
        state.points = f64::NAN;
        state.points_per_second = f64::INFINITY;
        state.max_energy = f64::NEG_INFINITY;
        let v = serde_json::to_value(&state).unwrap();
        assert!(v["points"].is_null());
        let fixed = inspect(v, NOW).unwrap();
        assert_eq!(fixed.points, 0.0);
        assert_eq!(fixed.points_per_second, DEFAULT_POINTS_PER_SECOND);
        assert_eq!(fixed.max_energy, DEFAULT_MAX_ENERGY);
    }

    #[test]
    fn non_finite_inside_upgrades_take_defaults() {
        let mut v = snapshot();
        v["upgrades"][0]["baseCost"] = Value::Null;
        v["upgrades"][0]["costMultiplier"] = json!(-1.0);
        v["upgrades"][0]["level"] = json!(2.7);
        v["upgrades"][0]["effectValue"] = Value::Null;
        let state = inspect(v, NOW).unwrap();
        let u = &state.upgrades[0];
        assert_eq!(u.base_cost, DEFAULT_BASE_COST);
        assert_eq!(u.cost_multiplier, DEFAULT_COST_MULTIPLIER);
        assert_eq!(u.level, 2);
        assert_eq!(u.effect_value, 0.0);
    }

    #[test]
    fn upgrades_without_id_are_dropped() {
        let mut v = snapshot();
        v["upgrades"]
            .as_array_mut()
            .unwrap()
            .push(json!({"level": 4, "baseCost": 10.0}));
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.upgrades.len(), 1);
    }

    #[test]
    fn broken_prerequisite_edge_is_removed() {
        let mut v = snapshot();
        v["upgrades"][0]["requires"] = json!({"level": 2});
        let state = inspect(v, NOW).unwrap();
        assert!(state.upgrades[0].requires.is_none());
    }

    #[test]
    fn negative_counters_clamp_to_zero() {
        let mut v = snapshot();
        v["totalPointsEarned"] = json!(-10.0);
        v["unclaimedOfflineRewards"] = json!(-3.0);
        v["upgradesPurchased"] = json!(-2);
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.total_points_earned, 0.0);
        assert_eq!(state.unclaimed_offline_rewards, 0.0);
        assert_eq!(state.upgrades_purchased, 0);
    }

    #[test]
    fn broken_timestamps_become_load_time() {
        let mut v = snapshot();
        v["lastSaveTime"] = Value::Null;
        v["lastDailyReset"] = json!(1.7e12);
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.last_save_time, NOW);
        assert_eq!(state.last_daily_reset, 1_700_000_000_000);
    }

    #[test]
    fn out_of_range_timestamps_become_load_time() {
        let mut v = snapshot();
        v["lastDailyReset"] = json!(-1e300);
        v["lastWeeklyReset"] = json!(i64::MIN);
        v["lastEnergyRegen"] = json!(-5);
        v["lastOfflineTime"] = json!(u64::MAX);
        v["sessionStartTime"] = json!(NOW + 2 * MS_PER_DAY);
        v["lastOfflineRewardTime"] = json!(NOW + 60_000);
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.last_daily_reset, NOW);
        assert_eq!(state.last_weekly_reset, NOW);
        assert_eq!(state.last_energy_regen, NOW);
        assert_eq!(state.last_offline_time, NOW);
        assert_eq!(state.session_start_time, NOW);
        // Small clock skew is tolerated.
        assert_eq!(state.last_offline_reward_time, NOW + 60_000);
    }

    #[test]
    fn overfull_energy_is_clamped() {
        let mut v = snapshot();
        v["currentEnergy"] = json!(500.0);
        let state = inspect(v, NOW).unwrap();
        assert_eq!(state.current_energy, state.max_energy);
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(validate(&json!([1, 2])), Err(ValidationError::NotAnObject));
    }

    fn messy_number() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            -1e9f64..1e9,
        ]
    }

    proptest! {
        #[test]
        fn inspected_state_always_holds_invariants(
            energy in messy_number(),
            max in messy_number(),
            total in messy_number(),
            cost in messy_number(),
        ) {
            let mut state = GameState::new(NOW, DEFAULT_MAX_ENERGY, vec![]);
            state.current_energy = energy;
            state.max_energy = max;
            state.total_points_earned = total;
            state.upgrades.push(Upgrade {
                id: UpgradeId::new("mining-drill"),
                name: String::new(),
                category: UpgradeCategory::Production,
                level: 1,
                base_cost: cost,
                cost_multiplier: cost,
                effect_value: cost,
                max_level: None,
                requires: None,
            });
            let v = serde_json::to_value(&state).unwrap();
            let fixed = inspect(v, NOW).unwrap();
            prop_assert!(fixed.check_invariants().is_ok());
            prop_assert!(fixed.upgrades[0].base_cost > 0.0);
            prop_assert!(fixed.upgrades[0].cost_multiplier > 0.0);
            prop_assert!(fixed.upgrades[0].effect_value.is_finite());
        }
    }
}
