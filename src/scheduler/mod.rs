//! Schedule calculation and the boundary-firing runtime

pub mod calculator;
pub mod runtime;

pub use calculator::AnchorStrategy;
pub use runtime::{Scheduler, SchedulerEvent, SchedulerState};
