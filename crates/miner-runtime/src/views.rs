//! Read-only projections for display. Nothing here mutates state.

use std::time::Duration;

use miner_core::{Boost, GameState, UpgradeCategory, UpgradeId};
use miner_econ::{cost, is_available};
use serde::Serialize;

/// Points per second after upgrades and boosts.
pub fn effective_rate(state: &GameState, boosts: &[Boost]) -> f64 {
    miner_econ::effective_rate(state, boosts)
}

/// Time since the session started; zero if the clock is behind it.
pub fn session_duration(state: &GameState, now_ms: i64) -> Duration {
    let ms = now_ms.saturating_sub(state.session_start_time).max(0);
    Duration::from_millis(ms as u64)
}

/// `1h 02m 03s`, `4m 05s` or `7s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeView {
    pub id: UpgradeId,
    pub name: String,
    pub category: UpgradeCategory,
    pub level: u32,
    pub max_level: Option<u32>,
    pub cost: u64,
    pub affordable: bool,
    pub available: bool,
    pub maxed: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpgradeFilter {
    #[default]
    All,
    /// Available, not maxed and payable now.
    Affordable,
    /// Prerequisite met and not maxed.
    Available,
    Owned,
    Category(UpgradeCategory),
}

impl UpgradeFilter {
    fn accepts(self, view: &UpgradeView) -> bool {
        match self {
            UpgradeFilter::All => true,
            UpgradeFilter::Affordable => view.affordable,
            UpgradeFilter::Available => view.available && !view.maxed,
            UpgradeFilter::Owned => view.level > 0,
            UpgradeFilter::Category(c) => view.category == c,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based.
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

fn view(state: &GameState, upgrade: &miner_core::Upgrade) -> UpgradeView {
    let price = cost(upgrade);
    let available = is_available(upgrade, &state.upgrades);
    let maxed = upgrade.is_maxed();
    UpgradeView {
        id: upgrade.id.clone(),
        name: upgrade.name.clone(),
        category: upgrade.category,
        level: upgrade.level,
        max_level: upgrade.max_level,
        cost: price,
        affordable: available && !maxed && state.points >= price as f64,
        available,
        maxed,
    }
}

/// Filtered upgrade list in catalog order, split into pages of `per_page`
/// (at least one). Pages past the end are empty.
pub fn upgrade_page(
    state: &GameState,
    filter: UpgradeFilter,
    page: usize,
    per_page: usize,
) -> Page<UpgradeView> {
    let per_page = per_page.max(1);
    let matching: Vec<UpgradeView> = state
        .upgrades
        .iter()
        .map(|u| view(state, u))
        .filter(|v| filter.accepts(v))
        .collect();
    let total = matching.len();
    let items = matching
        .into_iter()
        .skip(page.saturating_mul(per_page))
        .take(per_page)
        .collect();
    Page {
        items,
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
    }
}
