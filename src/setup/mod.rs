//! Bulk channel setup: planning, orchestration, completion records

pub mod coordinator;
pub mod planner;
pub mod record;

pub use coordinator::{EpgNotifier, SetupCoordinator};
pub use planner::{LibraryPlanInput, PlanInputs, build_plan, identity_key, plan_diff};
pub use record::SetupRecordStore;
