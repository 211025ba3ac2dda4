//! Schedule planning: recurrence expansion, operating-hour checks, holiday
//! rescheduling, conflict detection and the shared preview/create pipeline.

pub mod conflict;
pub mod error;
pub mod hours;
pub mod lifecycle;
pub mod planner;
pub mod preview;
pub mod reschedule;
pub mod service;
pub mod types;

pub use conflict::{overlaps, ConflictCandidate, ConflictDetector, SessionLookup};
pub use error::ScheduleError;
pub use hours::{BranchHours, BranchHoursValidator};
pub use planner::RecurrencePlanner;
pub use preview::{PlanOutcome, PreviewAssembler};
pub use reschedule::{RescheduleEngine, RescheduleOutcome};
pub use service::{
    CreateOptions, RegenerateOptions, RoomCheck, RoomCheckRequest, ScheduleService, SessionTransition,
    SessionTransitionResult,
};
pub use types::*;
