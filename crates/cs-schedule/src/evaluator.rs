//! Slot lookup and grid reads over the shared schedule document

use crate::grid::ScheduleGrid;
use crate::model::{DayOfWeek, ScheduleDocument, ScheduleSlot, TimeOfDay};
use chrono::{DateTime, Datelike, Local};
use cs_core::{decision, DebugOptions, EntityId, Mode, SharedClock};
use cs_presence::PresenceEvaluator;
use parking_lot::RwLock;
use std::sync::Arc;

/// The schedule document shared between the manager and evaluators
pub type SharedSchedule = Arc<RwLock<ScheduleDocument>>;

/// Answers "which slot applies right now" for tracked entities
pub struct ScheduleEvaluator {
    document: SharedSchedule,
    presence: Arc<PresenceEvaluator>,
    clock: SharedClock,
    debug: DebugOptions,
}

impl ScheduleEvaluator {
    pub fn new(
        document: SharedSchedule,
        presence: Arc<PresenceEvaluator>,
        clock: SharedClock,
        debug: DebugOptions,
    ) -> Self {
        Self {
            document,
            presence,
            clock,
            debug,
        }
    }

    /// The slot covering the current minute for `entity_id`
    ///
    /// `mode` defaults to the presence evaluator's current mode. Returns
    /// `None` for untracked entities and for uncovered times.
    pub fn evaluate_current_slot(&self, entity_id: &str, mode: Option<Mode>) -> Option<ScheduleSlot> {
        self.evaluate_slot_at(entity_id, mode, self.clock.now())
    }

    /// The slot covering the minute of `at`
    pub fn evaluate_slot_at(
        &self,
        entity_id: &str,
        mode: Option<Mode>,
        at: DateTime<Local>,
    ) -> Option<ScheduleSlot> {
        if !self.document.read().is_tracked(entity_id) {
            decision!(self.debug.schedule, entity_id, "Entity is not scheduled");
            return None;
        }

        let mode = mode.unwrap_or_else(|| self.presence.get_current_mode());
        let day = DayOfWeek::from(at.weekday());
        let minute = TimeOfDay::of(&at);
        let slot = self.document.read().slot_at(mode, day, minute).cloned();
        let range = slot.as_ref().map(ScheduleSlot::time_range);

        decision!(
            self.debug.schedule,
            entity_id,
            %mode,
            %day,
            %minute,
            slot = range.as_deref(),
            target = slot.as_ref().map(|s| s.target_value),
            "Schedule evaluated"
        );
        slot
    }

    /// The week's grid with coverage analysis, `None` for untracked entities
    pub fn get_schedule_grid(&self, entity_id: &str, mode: Mode) -> Option<ScheduleGrid> {
        let document = self.document.read();
        if !document.is_tracked(entity_id) {
            return None;
        }
        Some(ScheduleGrid::build(entity_id, mode, document.schedule(mode)))
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.document.read().is_tracked(entity_id)
    }

    pub fn tracked_entities(&self) -> Vec<EntityId> {
        self.document.read().entities.iter().cloned().collect()
    }

    /// Mode from the presence evaluator
    pub fn current_mode(&self) -> Mode {
        self.presence.get_current_mode()
    }
}

impl std::fmt::Debug for ScheduleEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleEvaluator").finish_non_exhaustive()
    }
}
