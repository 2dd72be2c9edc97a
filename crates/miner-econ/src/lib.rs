#![deny(warnings)]

//! Economic rules for Divine Miner: upgrade pricing and aggregation, the
//! per-tick rate/cost derivation, and offline catch-up.
//!
//! Everything here is pure. Functions take the state they need by reference
//! and never touch persistence or timers.

pub mod offline;
pub mod rates;
pub mod registry;

pub use offline::{apply_catch_up, compute_catch_up, CatchUp};
pub use rates::{
    boost_factor, effective_rate, energy_cost_per_second, regen_per_second, tick_economy,
    TickEconomy,
};
pub use registry::{
    aggregate_effect, cost, default_catalog, fresh_state, id_prefix, in_category, is_available,
    merge_catalog, validate_catalog, CatalogError, Modifiers,
};
