#![deny(warnings)]

//! Live session runtime: resource ledger, tick scheduler, notifications and
//! display projections on top of the persistence coordinator.

pub mod ledger;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod views;

pub use ledger::{
    apply_energy_regen, apply_mining_tick, claim_offline_rewards, purchase_upgrade,
    roll_period_resets, toggle_mining, Ledger, Rejection, TickOutcome, TickReport,
};
pub use notify::{Notifier, TracingNotifier};
pub use scheduler::{Scheduler, SchedulerEvent, TaskKind};
pub use session::Session;
