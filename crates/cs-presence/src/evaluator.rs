//! Presence evaluation
//!
//! Decision order, first match wins:
//! 1. override switches (force home, then force away)
//! 2. the custom expression, when configured and it evaluates cleanly
//! 3. no presence entities and no expression: Home
//! 4. aggregation of presence entities under the configured rule

use crate::config::{check_pairing, check_timeout, parse_entity_id, PresenceConfig};
use crate::error::{PresenceError, PresenceResult};
use cs_core::events::{ConfigChangedData, ModeChangedData};
use cs_core::{
    decision, Context, DebugOptions, EntityId, Mode, PresenceRule, SharedClock, SharedStateLookup,
    State, STATE_HOME, STATE_NOT_HOME, STATE_ON,
};
use cs_event_bus::EventBus;
use cs_expression::ExpressionEngine;
use cs_storage::SharedStore;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Callback invoked when the mode flips
pub type ModeListener = Arc<dyn Fn(&ModeChangedData) -> anyhow::Result<()> + Send + Sync>;

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Why a mode was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeReason {
    ForceHome,
    ForceAway,
    Expression,
    /// Nothing configured to look at
    Unconfigured,
    /// Aggregated over `valid` entities with a status, `home` of which are home
    Aggregated { home: usize, valid: usize },
}

/// A mode together with the step that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeEvaluation {
    pub mode: Mode,
    pub reason: ModeReason,
}

/// Derives the Home/Away mode from live entity states
pub struct PresenceEvaluator {
    config: RwLock<PresenceConfig>,
    lookup: SharedStateLookup,
    engine: ExpressionEngine,
    current_mode: Mutex<Option<Mode>>,
    listeners: RwLock<Vec<(ListenerId, ModeListener)>>,
    next_listener_id: AtomicU64,
    store: SharedStore<PresenceConfig>,
    event_bus: Arc<EventBus>,
    clock: SharedClock,
    debug: DebugOptions,
}

impl PresenceEvaluator {
    pub fn new(
        config: PresenceConfig,
        lookup: SharedStateLookup,
        store: SharedStore<PresenceConfig>,
        event_bus: Arc<EventBus>,
        clock: SharedClock,
        debug: DebugOptions,
    ) -> Self {
        let engine = ExpressionEngine::with_clock(lookup.clone(), clock.clone());
        Self {
            config: RwLock::new(config),
            lookup,
            engine,
            current_mode: Mutex::new(None),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            store,
            event_bus,
            clock,
            debug,
        }
    }

    /// Replace the configuration with the stored one, if any
    ///
    /// A stored configuration that fails validation is ignored.
    pub async fn load(&self) {
        match self.store.load().await {
            Ok(Some(stored)) => {
                let valid = stored.validate_shape().and_then(|_| match &stored.expression {
                    Some(expr) => self.engine.validate(expr).map_err(PresenceError::from),
                    None => Ok(()),
                });
                match valid {
                    Ok(()) => {
                        info!(
                            entities = stored.entities.len(),
                            rule = %stored.rule,
                            "Loaded presence configuration"
                        );
                        *self.config.write() = stored;
                    }
                    Err(e) => warn!(error = %e, "Stored presence configuration is invalid, ignoring"),
                }
            }
            Ok(None) => debug!("No stored presence configuration"),
            Err(e) => warn!(error = %e, "Failed to load presence configuration, using defaults"),
        }
    }

    // ==================== Evaluation ====================

    /// The current mode, notifying listeners when it differs from the last one
    pub fn get_current_mode(&self) -> Mode {
        let evaluation = self.evaluate_mode();
        decision!(
            self.debug.presence,
            mode = %evaluation.mode,
            reason = ?evaluation.reason,
            "Presence evaluated"
        );
        self.observe(evaluation.mode);
        evaluation.mode
    }

    /// Evaluate the mode without touching the cached mode
    pub fn evaluate_mode(&self) -> ModeEvaluation {
        let config = self.config.read().clone();

        if self.switch_on(&config.force_home_entity) {
            return ModeEvaluation {
                mode: Mode::Home,
                reason: ModeReason::ForceHome,
            };
        }
        if self.switch_on(&config.force_away_entity) {
            return ModeEvaluation {
                mode: Mode::Away,
                reason: ModeReason::ForceAway,
            };
        }

        if let Some(expression) = config.expression.as_deref() {
            match self.engine.evaluate_bool(expression) {
                Ok(home) => {
                    return ModeEvaluation {
                        mode: if home { Mode::Home } else { Mode::Away },
                        reason: ModeReason::Expression,
                    }
                }
                Err(e) => warn!(
                    error = %e,
                    "Presence expression failed, falling back to entity aggregation"
                ),
            }
        } else if config.entities.is_empty() {
            return ModeEvaluation {
                mode: Mode::Home,
                reason: ModeReason::Unconfigured,
            };
        }

        self.aggregate(&config)
    }

    fn switch_on(&self, entity_id: &EntityId) -> bool {
        self.lookup.status(&entity_id.to_string()).as_deref() == Some(STATE_ON)
    }

    fn aggregate(&self, config: &PresenceConfig) -> ModeEvaluation {
        let now = self.clock.utc_now();
        let timeout = config.staleness_timeout();
        let mut valid = 0;
        let mut home = 0;

        for entity_id in &config.entities {
            let Some(state) = self.lookup.get(&entity_id.to_string()) else {
                continue;
            };
            valid += 1;

            if state.age(now) > timeout {
                debug!(entity_id = %entity_id, age = ?state.age(now), "Presence entity is stale");
                continue;
            }
            if is_home(&state) {
                home += 1;
            }
        }

        let mode = match (valid, config.rule) {
            (0, _) => Mode::Away,
            (_, PresenceRule::EveryoneHome) if home == valid => Mode::Home,
            (_, PresenceRule::EveryoneHome) => Mode::Away,
            (_, _) if home > 0 => Mode::Home,
            _ => Mode::Away,
        };
        ModeEvaluation {
            mode,
            reason: ModeReason::Aggregated { home, valid },
        }
    }

    /// Update the cached mode, notifying on a flip
    fn observe(&self, mode: Mode) {
        let previous = self.current_mode.lock().replace(mode);
        match previous {
            None => debug!(mode = %mode, "Initial presence mode"),
            Some(old) if old != mode => self.notify(old, mode),
            Some(_) => {}
        }
    }

    fn notify(&self, old_mode: Mode, new_mode: Mode) {
        let data = ModeChangedData {
            old_mode,
            new_mode,
            timestamp: self.clock.utc_now(),
        };
        info!(old = %old_mode, new = %new_mode, "Presence mode changed");
        self.event_bus.fire_typed(data.clone(), Context::new());

        let listeners: Vec<(ListenerId, ModeListener)> = self.listeners.read().clone();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(listener = id.0, error = %e, "Mode listener failed"),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(listener = id.0, panic = %message, "Mode listener panicked");
                }
            }
        }
    }

    /// Last mode produced by [`get_current_mode`](Self::get_current_mode)
    pub fn current_mode(&self) -> Option<Mode> {
        *self.current_mode.lock()
    }

    // ==================== Listeners ====================

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModeChangedData) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    // ==================== Configuration ====================

    /// Validate and apply a new presence configuration
    ///
    /// Every presence entity must exist. On any validation or persistence
    /// failure the previous configuration stays in place.
    #[instrument(skip(self, entities, expression), fields(entities = entities.len()))]
    pub async fn configure(
        &self,
        entities: Vec<String>,
        rule: PresenceRule,
        timeout_seconds: u64,
        expression: Option<String>,
    ) -> PresenceResult<()> {
        let mut ids = Vec::with_capacity(entities.len());
        for raw in &entities {
            let id = parse_entity_id(raw)?;
            if !self.lookup.contains(&id.to_string()) {
                return Err(PresenceError::UnknownEntity {
                    entity_id: id.to_string(),
                });
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        check_timeout(timeout_seconds)?;

        let expression = expression
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        check_pairing(rule, expression.as_deref())?;
        if let Some(expr) = &expression {
            self.engine.validate(expr)?;
        }

        self.update_config("configure", |config| {
            config.entities = ids;
            config.rule = rule;
            config.timeout_seconds = timeout_seconds;
            config.expression = expression;
        })
        .await
    }

    /// Point the override switches at different entities
    ///
    /// The switches need not exist yet; a missing switch reads as off.
    #[instrument(skip(self))]
    pub async fn set_override_switches(&self, force_home: &str, force_away: &str) -> PresenceResult<()> {
        let force_home = parse_entity_id(force_home)?;
        let force_away = parse_entity_id(force_away)?;
        self.update_config("set_override_switches", |config| {
            config.force_home_entity = force_home;
            config.force_away_entity = force_away;
        })
        .await
    }

    async fn update_config(
        &self,
        operation: &str,
        change: impl FnOnce(&mut PresenceConfig),
    ) -> PresenceResult<()> {
        let (old, new) = {
            let mut config = self.config.write();
            let old = config.clone();
            change(&mut config);
            (old, config.clone())
        };

        if let Err(e) = self.store.save(&new).await {
            error!(operation, error = %e, "Failed to persist presence configuration, rolling back");
            *self.config.write() = old;
            return Err(e.into());
        }

        let data = ConfigChangedData::new("presence", operation, self.clock.utc_now(), &old, &new);
        if !data.is_noop() {
            info!(operation, changed = data.changes.len(), "Presence configuration changed");
            self.event_bus.fire_typed(data, Context::new());
        }

        self.get_current_mode();
        Ok(())
    }

    pub fn config(&self) -> PresenceConfig {
        self.config.read().clone()
    }

    /// Whether a change to `entity_id` can affect the mode
    ///
    /// With an expression configured any entity may be referenced.
    pub fn depends_on(&self, entity_id: &EntityId) -> bool {
        let config = self.config.read();
        config.expression.is_some()
            || config.entities.contains(entity_id)
            || config.force_home_entity == *entity_id
            || config.force_away_entity == *entity_id
    }
}

impl std::fmt::Debug for PresenceEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceEvaluator")
            .field("config", &*self.config.read())
            .field("current_mode", &self.current_mode())
            .finish_non_exhaustive()
    }
}

/// Classify one fresh observation by its kind
pub fn is_home(state: &State) -> bool {
    match state.kind() {
        "device_tracker" | "person" => state.state == STATE_HOME,
        "binary_sensor" | "input_boolean" => state.state == STATE_ON,
        _ => state.state != STATE_NOT_HOME,
    }
}
