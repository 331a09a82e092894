//! Weekly schedules for the climate scheduler
//!
//! A schedule holds, per presence mode and weekday, an ordered list of
//! `HH:MM-HH:MM` slots with a target setpoint. Slots may run past midnight
//! and may overlap; lookups take the first matching slot in stored order and
//! the grid view reports gaps and overlaps.
//!
//! - [`ScheduleEvaluator`] answers which slot applies to an entity now
//! - [`ScheduleManager`] owns the document and applies edits
//! - [`ScheduleGrid`] is the week view with coverage analysis

mod error;
mod evaluator;
mod grid;
mod manager;
mod model;

pub use error::{ScheduleError, ScheduleResult};
pub use evaluator::{ScheduleEvaluator, SharedSchedule};
pub use grid::{
    analyze_day, CoverageSummary, DayCoverage, DaySchedule, GridSlot, MinuteRange, ScheduleGrid,
    FULL_DAY_TOLERANCE_MINUTES,
};
pub use manager::ScheduleManager;
pub use model::{DayOfWeek, ScheduleDocument, ScheduleSlot, TimeOfDay, WeekSchedule, MINUTES_PER_DAY};
