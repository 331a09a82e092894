//! Schedule edits
//!
//! Every edit is applied in memory first and then persisted. A failed save
//! is logged and the edit stays in effect.

use crate::error::{ScheduleError, ScheduleResult};
use crate::evaluator::SharedSchedule;
use crate::model::{DayOfWeek, ScheduleDocument, ScheduleSlot, TimeOfDay};
use cs_core::events::SlotUpdatedData;
use cs_core::{Context, EntityId, Mode};
use cs_event_bus::EventBus;
use cs_storage::SharedStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Owner of the schedule document
pub struct ScheduleManager {
    document: SharedSchedule,
    store: SharedStore<ScheduleDocument>,
    event_bus: Arc<EventBus>,
}

impl ScheduleManager {
    pub fn new(store: SharedStore<ScheduleDocument>, event_bus: Arc<EventBus>) -> Self {
        Self {
            document: Arc::new(RwLock::new(ScheduleDocument::default())),
            store,
            event_bus,
        }
    }

    /// Handle for evaluators; sees every edit immediately
    pub fn document(&self) -> SharedSchedule {
        self.document.clone()
    }

    pub fn snapshot(&self) -> ScheduleDocument {
        self.document.read().clone()
    }

    /// Replace the in-memory document with the stored one
    pub async fn load(&self) {
        match self.store.load().await {
            Ok(Some(doc)) => {
                info!(
                    entities = doc.entities.len(),
                    home_slots = doc.home_schedule.slot_count(),
                    away_slots = doc.away_schedule.slot_count(),
                    "Loaded schedule"
                );
                *self.document.write() = doc;
            }
            Ok(None) => debug!("No stored schedule"),
            Err(e) => warn!(error = %e, "Failed to load schedule, starting empty"),
        }
    }

    // ==================== Entities ====================

    /// Start scheduling an entity, returning whether it was new
    #[instrument(skip(self))]
    pub async fn add_entity(&self, entity_id: &str) -> ScheduleResult<bool> {
        let id = parse_entity_id(entity_id)?;
        let added = self.document.write().entities.insert(id);
        if added {
            info!("Entity added to schedule");
            self.persist().await;
        }
        Ok(added)
    }

    /// Stop scheduling an entity, returning whether it was tracked
    #[instrument(skip(self))]
    pub async fn remove_entity(&self, entity_id: &str) -> ScheduleResult<bool> {
        let id = parse_entity_id(entity_id)?;
        let removed = self.document.write().entities.remove(&id);
        if removed {
            info!("Entity removed from schedule");
            self.persist().await;
        }
        Ok(removed)
    }

    // ==================== Slots ====================

    /// Insert a slot, replacing the one with the same start time if any
    #[instrument(skip(self, slot), fields(time_slot = %slot.time_range()))]
    pub async fn set_slot(&self, mode: Mode, day: DayOfWeek, slot: ScheduleSlot) -> ScheduleResult<()> {
        slot.validate()?;
        let replaced = {
            let mut document = self.document.write();
            let slots = document.schedule_mut(mode).day_mut(day);
            match slots.iter_mut().find(|s| s.start_time == slot.start_time) {
                Some(existing) => Some(std::mem::replace(existing, slot.clone())),
                None => {
                    slots.push(slot.clone());
                    None
                }
            }
        };

        if let Some(old) = replaced.filter(|old| old.end_time != slot.end_time) {
            self.announce(mode, day, &old, None);
        }
        self.announce(mode, day, &slot, Some(slot.target_value));
        self.persist().await;
        Ok(())
    }

    /// Remove the slot starting at `start_time`, returning whether one existed
    #[instrument(skip(self))]
    pub async fn remove_slot(&self, mode: Mode, day: DayOfWeek, start_time: TimeOfDay) -> ScheduleResult<bool> {
        let removed = {
            let mut document = self.document.write();
            let slots = document.schedule_mut(mode).day_mut(day);
            slots
                .iter()
                .position(|s| s.start_time == start_time)
                .map(|i| slots.remove(i))
        };

        let Some(removed) = removed else {
            return Ok(false);
        };
        self.announce(mode, day, &removed, None);
        self.persist().await;
        Ok(true)
    }

    /// Replace all slots of one day
    #[instrument(skip(self, slots), fields(slots = slots.len()))]
    pub async fn set_day(&self, mode: Mode, day: DayOfWeek, slots: Vec<ScheduleSlot>) -> ScheduleResult<()> {
        for slot in &slots {
            slot.validate()?;
        }

        let old = std::mem::replace(
            self.document.write().schedule_mut(mode).day_mut(day),
            slots.clone(),
        );

        for removed in old
            .iter()
            .filter(|o| !slots.iter().any(|n| n.time_range() == o.time_range()))
        {
            self.announce(mode, day, removed, None);
        }
        for slot in &slots {
            self.announce(mode, day, slot, Some(slot.target_value));
        }
        self.persist().await;
        Ok(())
    }

    /// Fire `climate_scheduler_slot_updated` once per tracked entity
    fn announce(&self, mode: Mode, day: DayOfWeek, slot: &ScheduleSlot, target_value: Option<f64>) {
        let entities: Vec<EntityId> = self.document.read().entities.iter().cloned().collect();
        for entity in entities {
            self.event_bus.fire_typed(
                SlotUpdatedData {
                    entity,
                    mode,
                    day: day.to_string(),
                    time_slot: slot.time_range(),
                    target_value,
                },
                Context::new(),
            );
        }
    }

    async fn persist(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            error!(error = %e, "Failed to persist schedule, keeping the change in memory");
        }
    }
}

impl std::fmt::Debug for ScheduleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleManager")
            .field("entities", &self.document.read().entities.len())
            .finish_non_exhaustive()
    }
}

fn parse_entity_id(entity_id: &str) -> ScheduleResult<EntityId> {
    entity_id
        .trim()
        .parse()
        .map_err(|source| ScheduleError::InvalidEntityId {
            entity_id: entity_id.to_string(),
            source,
        })
}
