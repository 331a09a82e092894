//! The evaluation loop
//!
//! For each tracked entity: mode from presence, slot from the schedule, then
//! the buffer decides whether the slot target is applied. A watcher feeds
//! observed setpoints back into the buffer and re-evaluates on mode flips.

use crate::actuator::{setpoint, Actuator};
use cs_buffer::BufferManager;
use cs_core::events::StateChangedData;
use cs_core::{EntityId, Mode};
use cs_event_bus::EventBus;
use cs_presence::PresenceEvaluator;
use cs_schedule::ScheduleEvaluator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// What one evaluation of an entity did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The slot target was sent to the device
    Applied { target: f64 },
    /// The buffer held the slot target back
    Suppressed { target: f64 },
    /// The entity is scheduled but no slot covers the current time
    NoSlot,
    /// The entity is not in the schedule
    Untracked,
    /// Actuation failed
    Failed { reason: String },
}

/// Ties presence, schedule and buffer together
pub struct Coordinator {
    presence: Arc<PresenceEvaluator>,
    schedule: Arc<ScheduleEvaluator>,
    buffer: Arc<BufferManager>,
    actuator: Arc<dyn Actuator>,
    event_bus: Arc<EventBus>,
}

impl Coordinator {
    pub fn new(
        presence: Arc<PresenceEvaluator>,
        schedule: Arc<ScheduleEvaluator>,
        buffer: Arc<BufferManager>,
        actuator: Arc<dyn Actuator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            presence,
            schedule,
            buffer,
            actuator,
            event_bus,
        }
    }

    /// Evaluate one entity and apply its slot target unless suppressed
    #[instrument(skip(self))]
    pub async fn evaluate_entity(&self, entity_id: &str, force: bool) -> TickOutcome {
        if !self.schedule.is_tracked(entity_id) {
            return TickOutcome::Untracked;
        }

        let mode = self.presence.get_current_mode();
        self.apply_slot(entity_id, mode, force).await
    }

    async fn apply_slot(&self, entity_id: &str, mode: Mode, force: bool) -> TickOutcome {
        let Some(slot) = self.schedule.evaluate_current_slot(entity_id, Some(mode)) else {
            return TickOutcome::NoSlot;
        };
        let target = slot.target_value;

        if self
            .buffer
            .should_suppress_change(entity_id, target, slot.buffer_override.as_ref(), force)
        {
            return TickOutcome::Suppressed { target };
        }

        let id: EntityId = match entity_id.parse() {
            Ok(id) => id,
            Err(e) => {
                return TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        match self.actuator.apply(&id, target).await {
            Ok(()) => {
                // The watcher skips writes that leave the setpoint unchanged
                if let Err(e) = self
                    .buffer
                    .record_scheduled_change(entity_id, &serde_json::json!(target))
                    .await
                {
                    warn!(error = %e, target, "Failed to record scheduled setpoint");
                }
                TickOutcome::Applied { target }
            }
            Err(e) => {
                error!(error = %e, target, "Failed to apply scheduled setpoint");
                TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Evaluate every tracked entity once
    pub async fn tick(&self) -> Vec<(EntityId, TickOutcome)> {
        let mode = self.presence.get_current_mode();
        let entities = self.schedule.tracked_entities();
        let mut outcomes = Vec::with_capacity(entities.len());

        for entity in entities {
            let outcome = self.apply_slot(&entity.to_string(), mode, false).await;
            debug!(entity_id = %entity, ?outcome, "Entity evaluated");
            outcomes.push((entity, outcome));
        }
        outcomes
    }

    // ==================== Watchers ====================

    /// React to one `state_changed` event
    ///
    /// Presence inputs re-evaluate the mode and, on a flip, every entity.
    /// Setpoint changes of tracked entities are recorded in the buffer as
    /// scheduled when the scheduler wrote them and as manual otherwise.
    pub async fn handle_state_change(&self, data: &StateChangedData) {
        if self.presence.depends_on(&data.entity_id) {
            let previous = self.presence.current_mode();
            let mode = self.presence.get_current_mode();
            if previous.is_some_and(|previous| previous != mode) {
                info!(%mode, trigger = %data.entity_id, "Mode changed, re-evaluating schedule");
                self.tick().await;
            }
        }

        let entity_id = data.entity_id.to_string();
        if !self.schedule.is_tracked(&entity_id) {
            return;
        }
        let Some(new_state) = &data.new_state else {
            return;
        };
        let Some(value) = setpoint(new_state) else {
            return;
        };
        if data.old_state.as_ref().and_then(setpoint).as_ref() == Some(&value) {
            return;
        }

        let result = if new_state.context.is_scheduler() {
            self.buffer.record_scheduled_change(&entity_id, &value).await
        } else {
            self.buffer.record_manual_change(&entity_id, &value).await
        };
        if let Err(e) = result {
            warn!(entity_id, error = %e, "Could not record setpoint change");
        }
    }

    /// Tick on `interval` and watch state changes until `shutdown` fires
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_seconds = interval.as_secs(), "Starting climate scheduler");

        let mut events = self.event_bus.subscribe_typed::<StateChangedData>();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                event_result = events.recv() => {
                    match event_result {
                        Ok(event) => self.handle_state_change(&event.data).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Coordinator lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event bus closed, stopping coordinator");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Climate scheduler stopped");
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
