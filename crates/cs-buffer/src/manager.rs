//! The change-suppression engine
//!
//! Decides whether a scheduled setpoint should be held back, either because
//! the device is already within the dead-band of the target or because the
//! user adjusted it recently.

use crate::config::BufferConfig;
use crate::error::{BufferError, BufferResult};
use crate::history::EntityHistory;
use crate::settings::{BufferDocument, BufferSettings};
use cs_core::events::ConfigChangedData;
use cs_core::{decision, Context, DebugOptions, EntityId, SharedClock};
use cs_event_bus::EventBus;
use cs_storage::SharedStore;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a suppression check, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuppressionDecision {
    /// The caller forced the change through
    ForceApply,
    /// Nothing has been observed for the entity yet
    NoHistory,
    /// The effective buffer is switched off
    Disabled,
    /// The current value is already within tolerance of the target
    WithinTolerance { delta: f64, tolerance: f64 },
    /// A recent manual change is being respected
    RecentManualChange { delta: f64, tolerance: f64 },
    /// Nothing holds the change back
    Apply { delta: f64, tolerance: f64 },
}

impl SuppressionDecision {
    pub fn suppresses(&self) -> bool {
        matches!(
            self,
            SuppressionDecision::WithinTolerance { .. }
                | SuppressionDecision::RecentManualChange { .. }
        )
    }
}

/// Which timestamp a recorded change stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Manual,
    Scheduled,
}

/// Buffer settings, entity histories and the suppression decision
pub struct BufferManager {
    settings: RwLock<BufferSettings>,
    histories: DashMap<String, EntityHistory>,
    store: SharedStore<BufferDocument>,
    event_bus: Arc<EventBus>,
    clock: SharedClock,
    debug: DebugOptions,
}

impl BufferManager {
    /// Create a manager using `global` until a stored document is loaded
    pub fn new(
        global: BufferConfig,
        store: SharedStore<BufferDocument>,
        event_bus: Arc<EventBus>,
        clock: SharedClock,
        debug: DebugOptions,
    ) -> Self {
        Self {
            settings: RwLock::new(BufferSettings {
                global,
                entities: Default::default(),
            }),
            histories: DashMap::new(),
            store,
            event_bus,
            clock,
            debug,
        }
    }

    /// Replace in-memory state with the stored document
    ///
    /// A missing document keeps the constructor defaults; an unreadable one
    /// is logged and also keeps them.
    pub async fn load(&self) {
        let doc = match self.store.load().await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!("No stored buffer settings, using defaults");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load buffer settings, using defaults");
                return;
            }
        };

        let invalid = doc
            .settings
            .entities
            .iter()
            .filter(|(_, raw)| BufferConfig::from_value(raw).is_err())
            .count();
        if invalid > 0 {
            warn!(invalid, "Stored entity buffer overrides are invalid and will be ignored");
        }

        self.histories.clear();
        for (entity, history) in doc.histories {
            self.histories.insert(entity, history);
        }
        info!(
            entities = doc.settings.entities.len(),
            histories = self.histories.len(),
            "Loaded buffer settings"
        );
        *self.settings.write() = doc.settings;
    }

    // ==================== Decisions ====================

    /// Resolve the buffer for a decision: slot, then entity, then global
    ///
    /// A malformed override at either level is skipped.
    pub fn get_effective_config(&self, slot_config: Option<&Value>, entity_id: Option<&str>) -> BufferConfig {
        if let Some(raw) = slot_config.filter(|v| !v.is_null()) {
            match BufferConfig::from_value(raw) {
                Ok(config) => return config,
                Err(e) => debug!(error = %e, "Ignoring malformed slot buffer override"),
            }
        }

        let settings = self.settings.read();
        if let Some(raw) = entity_id.and_then(|id| settings.entities.get(id)) {
            match BufferConfig::from_value(raw) {
                Ok(config) => return config,
                Err(e) => debug!(
                    entity_id = entity_id.unwrap_or_default(),
                    error = %e,
                    "Ignoring malformed entity buffer override"
                ),
            }
        }

        settings.global.clone()
    }

    /// Work out whether applying `target` to `entity_id` should be held back
    pub fn evaluate_suppression(
        &self,
        entity_id: &str,
        target: f64,
        slot_config: Option<&Value>,
        force_apply: bool,
    ) -> SuppressionDecision {
        if force_apply {
            return SuppressionDecision::ForceApply;
        }

        let Some(history) = self.histories.get(entity_id).map(|h| h.clone()) else {
            return SuppressionDecision::NoHistory;
        };

        let config = self.get_effective_config(slot_config, Some(entity_id));
        if !config.enabled {
            return SuppressionDecision::Disabled;
        }

        let tolerance = config.value_delta;
        let delta = (history.last_known_value - target).abs();
        if delta <= tolerance {
            return SuppressionDecision::WithinTolerance { delta, tolerance };
        }

        let now = self.clock.utc_now();
        if history.manual_change_within(config.time_window(), now) && delta <= tolerance {
            return SuppressionDecision::RecentManualChange { delta, tolerance };
        }

        SuppressionDecision::Apply { delta, tolerance }
    }

    /// Whether applying `target` to `entity_id` should be skipped
    pub fn should_suppress_change(
        &self,
        entity_id: &str,
        target: f64,
        slot_config: Option<&Value>,
        force_apply: bool,
    ) -> bool {
        let outcome = self.evaluate_suppression(entity_id, target, slot_config, force_apply);
        decision!(
            self.debug.buffer,
            entity_id,
            target,
            ?outcome,
            suppress = outcome.suppresses(),
            "Buffer decision"
        );
        outcome.suppresses()
    }

    // ==================== Observations ====================

    /// Record a value the user set outside the scheduler
    pub async fn record_manual_change(&self, entity_id: &str, value: &Value) -> BufferResult<()> {
        self.record(entity_id, value, ChangeKind::Manual).await
    }

    /// Record a value the scheduler applied
    pub async fn record_scheduled_change(&self, entity_id: &str, value: &Value) -> BufferResult<()> {
        self.record(entity_id, value, ChangeKind::Scheduled).await
    }

    #[instrument(skip(self, value), fields(entity_id = %entity_id))]
    async fn record(&self, entity_id: &str, value: &Value, kind: ChangeKind) -> BufferResult<()> {
        let Some(numeric) = numeric_value(value) else {
            warn!(%value, ?kind, "Ignoring non-numeric value");
            return Err(BufferError::InvalidValue {
                entity_id: entity_id.to_string(),
                value: value.to_string(),
            });
        };
        let id: EntityId = entity_id
            .parse()
            .map_err(|source| BufferError::InvalidEntityId {
                entity_id: entity_id.to_string(),
                source,
            })?;

        let now = self.clock.utc_now();
        let config = self.get_effective_config(None, Some(entity_id));
        {
            let mut history = self
                .histories
                .entry(entity_id.to_string())
                .or_insert_with(|| EntityHistory::new(id, numeric, config.clone()));
            history.last_known_value = numeric;
            history.config = config;
            match kind {
                ChangeKind::Manual => history.last_manual_change = Some(now),
                ChangeKind::Scheduled => history.last_scheduled_change = Some(now),
            }
        }
        decision!(self.debug.buffer, value = numeric, ?kind, "Recorded change");

        if let Err(e) = self.store.save(&self.snapshot()).await {
            error!(error = %e, "Failed to persist entity history");
        }
        Ok(())
    }

    // ==================== Configuration ====================

    /// Replace the global buffer
    #[instrument(skip(self, config))]
    pub async fn set_global_config(&self, config: BufferConfig) -> BufferResult<()> {
        config.validate()?;
        self.update_settings("set_global_config", |settings| settings.global = config)
            .await
    }

    /// Set or replace one entity's override
    #[instrument(skip(self, config), fields(entity_id = %entity_id))]
    pub async fn set_entity_config(&self, entity_id: &str, config: BufferConfig) -> BufferResult<()> {
        config.validate()?;
        entity_id
            .parse::<EntityId>()
            .map_err(|source| BufferError::InvalidEntityId {
                entity_id: entity_id.to_string(),
                source,
            })?;
        let key = entity_id.to_string();
        self.update_settings("set_entity_config", move |settings| {
            settings.entities.insert(key, config.to_value());
        })
        .await
    }

    /// Drop one entity's override, returning whether it existed
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn remove_entity_config(&self, entity_id: &str) -> BufferResult<bool> {
        if !self.settings.read().entities.contains_key(entity_id) {
            return Ok(false);
        }
        let key = entity_id.to_string();
        self.update_settings("remove_entity_config", move |settings| {
            settings.entities.remove(&key);
        })
        .await?;
        Ok(true)
    }

    /// Apply a settings change, persist it, and announce it
    ///
    /// The previous settings are restored if the save fails.
    async fn update_settings(
        &self,
        operation: &str,
        change: impl FnOnce(&mut BufferSettings),
    ) -> BufferResult<()> {
        let (old, new) = {
            let mut settings = self.settings.write();
            let old = settings.clone();
            change(&mut settings);
            (old, settings.clone())
        };
        self.refresh_history_configs();

        if let Err(e) = self.store.save(&self.snapshot()).await {
            error!(operation, error = %e, "Failed to persist buffer settings, rolling back");
            *self.settings.write() = old;
            self.refresh_history_configs();
            return Err(e.into());
        }

        let data = ConfigChangedData::new("buffer", operation, self.clock.utc_now(), &old, &new);
        if !data.is_noop() {
            info!(operation, changed = data.changes.len(), "Buffer settings changed");
            self.event_bus.fire_typed(data, Context::new());
        }
        Ok(())
    }

    // ==================== Repair ====================

    /// Drop invalid entity overrides and refresh history snapshots
    ///
    /// Repairs are kept in memory even if persisting them fails.
    #[instrument(skip(self))]
    pub async fn repair(&self) -> BufferResult<RepairReport> {
        let removed_overrides: Vec<String> = {
            let mut settings = self.settings.write();
            let invalid: Vec<String> = settings
                .entities
                .iter()
                .filter(|(_, raw)| BufferConfig::from_value(raw).is_err())
                .map(|(id, _)| id.clone())
                .collect();
            for id in &invalid {
                settings.entities.remove(id);
            }
            invalid
        };
        let refreshed_histories = self.refresh_history_configs();

        for id in &removed_overrides {
            warn!(entity_id = %id, "Removed invalid buffer override");
        }
        info!(
            removed = removed_overrides.len(),
            refreshed = refreshed_histories,
            "Repaired buffer settings"
        );

        if let Err(e) = self.store.save(&self.snapshot()).await {
            error!(error = %e, "Failed to persist repaired buffer settings");
        }
        Ok(RepairReport {
            removed_overrides,
            refreshed_histories,
        })
    }

    /// Forget everything observed for one entity
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn clear_history(&self, entity_id: &str) -> BufferResult<bool> {
        if self.histories.remove(entity_id).is_none() {
            return Ok(false);
        }
        info!("Cleared entity history");
        self.store.save(&self.snapshot()).await?;
        Ok(true)
    }

    fn refresh_history_configs(&self) -> usize {
        let ids: Vec<String> = self.histories.iter().map(|h| h.key().clone()).collect();
        for id in &ids {
            let config = self.get_effective_config(None, Some(id));
            if let Some(mut history) = self.histories.get_mut(id) {
                history.config = config;
            }
        }
        ids.len()
    }

    // ==================== Accessors ====================

    pub fn history(&self, entity_id: &str) -> Option<EntityHistory> {
        self.histories.get(entity_id).map(|h| h.clone())
    }

    pub fn global_config(&self) -> BufferConfig {
        self.settings.read().global.clone()
    }

    /// Stored entity overrides, including ones that fail validation
    pub fn entity_overrides(&self) -> Vec<(String, Value)> {
        self.settings
            .read()
            .entities
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn snapshot(&self) -> BufferDocument {
        BufferDocument {
            settings: self.settings.read().clone(),
            histories: self
                .histories
                .iter()
                .map(|h| (h.key().clone(), h.value().clone()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("histories", &self.histories.len())
            .finish_non_exhaustive()
    }
}

/// What [`BufferManager::repair`] changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub removed_overrides: Vec<String>,
    pub refreshed_histories: usize,
}

/// Numbers and numeric strings, if finite
fn numeric_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
