//! Offboarding engine: resolve, capture, plan, apply, capture again, report.

pub mod apply;
pub mod artifacts;
pub mod mirror;
pub mod model;
pub mod outcome;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod run_config;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{DelegationGrant, DelegationRight, GroupRef, PrincipalRef, Snapshot};
pub use outcome::{ActionOutcome, OutcomeStatus};
pub use plan::{build_plan, Area, PlanItem, AREA_ORDER};
pub use run_config::{RunConfig, RunMode};
