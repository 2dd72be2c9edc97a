//! Static upgrade catalog and the pure folds over owned upgrade levels.

use miner_core::{
    EngineConfig, GameState, Upgrade, UpgradeCategory, UpgradeId, UpgradeRequirement,
    DEFAULT_BASE_COST, DEFAULT_COST_MULTIPLIER,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Structural problems in an upgrade catalog.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate upgrade id: {0}")]
    DuplicateId(String),
    #[error("upgrade {upgrade} requires unknown upgrade {requires}")]
    UnknownPrerequisite { upgrade: String, requires: String },
    #[error("prerequisite cycle through {0}")]
    Cycle(String),
}

fn def(
    id: &str,
    name: &str,
    category: UpgradeCategory,
    base_cost: f64,
    cost_multiplier: f64,
    effect_value: f64,
    max_level: Option<u32>,
    requires: Option<(&str, u32)>,
) -> Upgrade {
    Upgrade {
        id: UpgradeId::new(id),
        name: name.to_string(),
        category,
        level: 0,
        base_cost,
        cost_multiplier,
        effect_value,
        max_level,
        requires: requires.map(|(id, level)| UpgradeRequirement {
            upgrade_id: UpgradeId::new(id),
            level,
        }),
    }
}

/// The shipped catalog, every level at 0.
pub fn default_catalog() -> Vec<Upgrade> {
    use UpgradeCategory::*;
    vec![
        def("mining-drill", "Mining Drill", Production, 25.0, 1.12, 0.5, None, None),
        def(
            "mining-rig",
            "Mining Rig",
            Production,
            250.0,
            1.15,
            3.0,
            None,
            Some(("mining-drill", 5)),
        ),
        def(
            "mining-multiplier",
            "Divine Focus",
            Multiplier,
            500.0,
            1.25,
            0.10,
            Some(10),
            Some(("mining-rig", 1)),
        ),
        def(
            "energy-capacity",
            "Energy Cells",
            Capacity,
            100.0,
            1.2,
            25.0,
            Some(20),
            None,
        ),
        def("energy-regen-1", "Energy Siphon", Regen, 50.0, 1.15, 0.25, Some(20), None),
        def(
            "energy-regen-2",
            "Energy Well",
            Regen,
            400.0,
            1.2,
            1.0,
            Some(10),
            Some(("energy-regen-1", 5)),
        ),
        def(
            "energy-efficiency",
            "Efficient Picks",
            Efficiency,
            150.0,
            1.3,
            0.05,
            Some(15),
            None,
        ),
        def(
            "auto-miner",
            "Auto Miner",
            Automation,
            1000.0,
            1.0,
            1.0,
            Some(1),
            Some(("energy-regen-1", 3)),
        ),
    ]
}

/// A fresh record for a new player with the shipped catalog.
pub fn fresh_state(now_ms: i64, config: &EngineConfig) -> GameState {
    GameState::new(now_ms, config.energy.base_max_energy, default_catalog())
}

/// Validate catalog structure: unique ids, known prerequisites, no cycles.
pub fn validate_catalog(catalog: &[Upgrade]) -> Result<(), CatalogError> {
    let mut edges: BTreeMap<&str, Option<&str>> = BTreeMap::new();
    for u in catalog {
        let req = u.requires.as_ref().map(|r| r.upgrade_id.as_str());
        if edges.insert(u.id.as_str(), req).is_some() {
            return Err(CatalogError::DuplicateId(u.id.0.clone()));
        }
    }
    for (&id, &req) in &edges {
        if let Some(req) = req {
            if !edges.contains_key(req) {
                return Err(CatalogError::UnknownPrerequisite {
                    upgrade: id.to_string(),
                    requires: req.to_string(),
                });
            }
        }
    }
    // Each node has at most one outgoing edge, so following the chain either
    // terminates or revisits a node.
    for &start in edges.keys() {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(CatalogError::Cycle(id.to_string()));
            }
            cursor = edges.get(id).copied().flatten();
        }
    }
    Ok(())
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Price of the next level: `floor(baseCost * costMultiplier^level)`.
///
/// Malformed `baseCost`/`costMultiplier` fall back to 25 and 1.12. Saturates
/// at `u64::MAX`.
///
/// Example:
/// a `{baseCost: 25, costMultiplier: 1.12, level: 3}` upgrade costs 35.
pub fn cost(upgrade: &Upgrade) -> u64 {
    let base = positive_or(upgrade.base_cost, DEFAULT_BASE_COST);
    let mult = positive_or(upgrade.cost_multiplier, DEFAULT_COST_MULTIPLIER);
    let exponent = upgrade.level.min(i32::MAX as u32) as i32;
    let raw = (base * mult.powi(exponent)).floor();
    if !raw.is_finite() || raw >= u64::MAX as f64 {
        return u64::MAX;
    }
    raw as u64
}

/// Sum of `effectValue * level` over upgrades matching `predicate`.
/// Non-finite operands contribute 0.
pub fn aggregate_effect<F>(upgrades: &[Upgrade], predicate: F) -> f64
where
    F: Fn(&Upgrade) -> bool,
{
    upgrades
        .iter()
        .filter(|u| predicate(*u))
        .map(|u| finite_or_zero(finite_or_zero(u.effect_value) * u.level as f64))
        .sum()
}

/// Predicate selecting upgrades whose id starts with `prefix`.
pub fn id_prefix(prefix: &str) -> impl Fn(&Upgrade) -> bool + '_ {
    move |u| u.id.as_str().starts_with(prefix)
}

/// Predicate selecting upgrades of one category.
pub fn in_category(category: UpgradeCategory) -> impl Fn(&Upgrade) -> bool {
    move |u| u.category == category
}

/// Whether `upgrade`'s single prerequisite edge is satisfied by the levels in
/// `catalog`. The check is not transitive.
pub fn is_available(upgrade: &Upgrade, catalog: &[Upgrade]) -> bool {
    match &upgrade.requires {
        None => true,
        Some(req) => catalog
            .iter()
            .find(|u| u.id == req.upgrade_id)
            .is_some_and(|u| u.level >= req.level),
    }
}

/// Rebuild the upgrade list from the shipped catalog, carrying over saved
/// levels for known ids (clamped to `max_level`). Unknown saved ids are
/// dropped; catalog entries missing from the save start at level 0.
pub fn merge_catalog(saved: &[Upgrade]) -> Vec<Upgrade> {
    let mut merged = default_catalog();
    for upgrade in &mut merged {
        if let Some(prev) = saved.iter().find(|s| s.id == upgrade.id) {
            upgrade.level = match upgrade.max_level {
                Some(max) => prev.level.min(max),
                None => prev.level,
            };
        }
    }
    let dropped = saved
        .iter()
        .filter(|s| !merged.iter().any(|u| u.id == s.id))
        .count();
    if dropped > 0 {
        debug!(dropped, "dropped upgrades unknown to the catalog");
    }
    merged
}

/// Aggregate modifiers folded from owned upgrade levels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Modifiers {
    /// Fractional bonus on the effective mining rate.
    pub rate_bonus: f64,
    /// Fractional discount on energy cost, before the floor is applied.
    pub energy_cost_discount: f64,
    /// Energy capacity above the base.
    pub capacity_bonus: f64,
    /// Energy per second above the base regeneration.
    pub regen_bonus: f64,
    /// Whether an automation upgrade is owned.
    pub automation: bool,
}

impl Modifiers {
    pub fn from_upgrades(upgrades: &[Upgrade]) -> Self {
        use UpgradeCategory::*;
        Self {
            rate_bonus: aggregate_effect(upgrades, in_category(Multiplier)),
            energy_cost_discount: aggregate_effect(upgrades, in_category(Efficiency)),
            capacity_bonus: aggregate_effect(upgrades, in_category(Capacity)),
            regen_bonus: aggregate_effect(upgrades, in_category(Regen)),
            automation: upgrades
                .iter()
                .any(|u| u.category == Automation && u.is_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_level(id: &str, level: u32) -> Upgrade {
        let mut u = default_catalog()
            .into_iter()
            .find(|u| u.id.as_str() == id)
            .unwrap();
        u.level = level;
        u
    }

    #[test]
    fn shipped_catalog_is_a_dag() {
        validate_catalog(&default_catalog()).unwrap();
    }

    #[test]
    fn cost_example() {
        let mut u = with_level("mining-drill", 3);
        u.base_cost = 25.0;
        u.cost_multiplier = 1.12;
        assert_eq!(cost(&u), 35);
    }

    #[test]
    fn cost_sequence_is_deterministic() {
        let run = || {
            let mut u = with_level("mining-drill", 0);
            let first = cost(&u);
            u.level += 1;
            (first, cost(&u))
        };
        assert_eq!(run(), (25, 28));
        assert_eq!(run(), run());
    }

    #[test]
    fn cost_falls_back_on_malformed_fields() {
        let mut u = with_level("mining-drill", 0);
        u.base_cost = f64::NAN;
        u.cost_multiplier = -3.0;
        assert_eq!(cost(&u), 25);
        u.level = 1;
        assert_eq!(cost(&u), 28);
    }

    #[test]
    fn cost_saturates() {
        let mut u = with_level("mining-drill", u32::MAX);
        u.cost_multiplier = 10.0;
        assert_eq!(cost(&u), u64::MAX);
    }

    #[test]
    fn aggregate_ignores_non_finite_effects() {
        let mut a = with_level("energy-regen-1", 4);
        a.effect_value = 0.25;
        let mut b = with_level("energy-regen-2", 2);
        b.effect_value = f64::NAN;
        let c = with_level("mining-drill", 7);
        let total = aggregate_effect(&[a, b, c], id_prefix("energy-regen"));
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn availability_checks_single_edge() {
        let mut catalog = default_catalog();
        let rig = catalog
            .iter()
            .find(|u| u.id.as_str() == "mining-rig")
            .cloned()
            .unwrap();
        assert!(!is_available(&rig, &catalog));
        catalog
            .iter_mut()
            .find(|u| u.id.as_str() == "mining-drill")
            .unwrap()
            .level = 5;
        assert!(is_available(&rig, &catalog));
        // Prerequisite of the prerequisite is not consulted.
        let multiplier = with_level("mining-multiplier", 0);
        assert!(!is_available(&multiplier, &catalog));
    }

    #[test]
    fn detects_cycles_and_dangling_edges() {
        let mut a = with_level("mining-drill", 0);
        let mut b = with_level("mining-rig", 0);
        a.requires = Some(UpgradeRequirement {
            upgrade_id: UpgradeId::new("mining-rig"),
            level: 1,
        });
        b.requires = Some(UpgradeRequirement {
            upgrade_id: UpgradeId::new("mining-drill"),
            level: 1,
        });
        assert!(matches!(
            validate_catalog(&[a.clone(), b]),
            Err(CatalogError::Cycle(_))
        ));
        assert_eq!(
            validate_catalog(&[a.clone()]),
            Err(CatalogError::UnknownPrerequisite {
                upgrade: "mining-drill".into(),
                requires: "mining-rig".into()
            })
        );
        assert_eq!(
            validate_catalog(&[with_level("auto-miner", 0), with_level("auto-miner", 0)]),
            Err(CatalogError::DuplicateId("auto-miner".into()))
        );
    }

    #[test]
    fn merge_keeps_levels_and_drops_unknown() {
        let mut stale = with_level("mining-drill", 9);
        stale.base_cost = 1.0;
        let mut capped = with_level("auto-miner", 0);
        capped.level = 4;
        let mut ghost = with_level("mining-drill", 2);
        ghost.id = UpgradeId::new("retired-upgrade");
        let merged = merge_catalog(&[stale, capped, ghost]);
        assert_eq!(merged.len(), default_catalog().len());
        let drill = merged.iter().find(|u| u.id.as_str() == "mining-drill").unwrap();
        assert_eq!(drill.level, 9);
        assert_eq!(drill.base_cost, 25.0);
        let auto = merged.iter().find(|u| u.id.as_str() == "auto-miner").unwrap();
        assert_eq!(auto.level, 1);
        assert!(!merged.iter().any(|u| u.id.as_str() == "retired-upgrade"));
    }

    #[test]
    fn modifiers_fold_by_category() {
        let upgrades = vec![
            with_level("energy-capacity", 2),
            with_level("energy-efficiency", 3),
            with_level("mining-multiplier", 1),
            with_level("auto-miner", 1),
        ];
        let m = Modifiers::from_upgrades(&upgrades);
        assert_eq!(m.capacity_bonus, 50.0);
        assert!((m.energy_cost_discount - 0.15).abs() < 1e-12);
        assert!((m.rate_bonus - 0.10).abs() < 1e-12);
        assert_eq!(m.regen_bonus, 0.0);
        assert!(m.automation);
    }

    proptest! {
        #[test]
        fn cost_is_monotonic_in_level(level in 0u32..200) {
            let lo = with_level("energy-regen-1", level);
            let hi = with_level("energy-regen-1", level + 1);
            prop_assert!(cost(&hi) >= cost(&lo));
        }

        #[test]
        fn aggregate_is_always_finite(effect in prop::num::f64::ANY, level in 0u32..1000) {
            let mut u = with_level("energy-regen-1", level);
            u.effect_value = effect;
            prop_assert!(aggregate_effect(&[u], |_| true).is_finite());
        }
    }
}
