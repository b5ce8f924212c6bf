//! Progressive loading sessions.
//!
//! A session loads one subject in ordered phases: the critical phase is
//! fetched immediately and must succeed; deferred phases are scheduled
//! after network-dependent delays and fail independently.

mod phases;
mod registry;
mod scheduler;

pub use phases::{
    FnFetcher, PhaseFetcher, PhasePriority, PhaseSpec, PhaseTable, PhaseTableBuilder,
    REFERENCE_PHASES,
};
pub use registry::{LoadingSession, PhaseStatus, SessionRegistry};
pub use scheduler::{PhaseScheduler, SchedulerSettings};
