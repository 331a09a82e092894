//! Climate scheduler daemon
//!
//! Usage: `climate-scheduler [config.yaml]`. Without an argument the path is
//! taken from `CLIMATE_SCHEDULER_CONFIG`, then `climate_scheduler.yaml`.

use anyhow::{Context as _, Result};
use cs_buffer::{BufferConfig, BufferDocument, BufferManager};
use cs_config::{load_config, SchedulerConfig};
use cs_coordinator::{Coordinator, StateMachineActuator};
use cs_core::{Context, EntityId, SharedClock, SystemClock};
use cs_event_bus::EventBus;
use cs_presence::{PresenceConfig, PresenceEvaluator};
use cs_schedule::{ScheduleDocument, ScheduleEvaluator, ScheduleManager};
use cs_state_machine::StateMachine;
use cs_storage::{JsonStore, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG_ENV: &str = "CLIMATE_SCHEDULER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "climate_scheduler.yaml";

/// A fully wired scheduler instance
pub struct ClimateScheduler {
    pub states: Arc<StateMachine>,
    pub presence: Arc<PresenceEvaluator>,
    pub schedule: Arc<ScheduleManager>,
    pub buffer: Arc<BufferManager>,
    pub coordinator: Arc<Coordinator>,
}

impl ClimateScheduler {
    /// Wire every component from `config`, reading stored documents from its
    /// storage directory
    pub async fn build(config: &SchedulerConfig, clock: SharedClock) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::with_clock(bus.clone(), clock.clone()));

        for seed in &config.initial_states {
            let entity_id: EntityId = seed
                .entity_id
                .parse()
                .with_context(|| format!("invalid initial state entity {}", seed.entity_id))?;
            states.set(entity_id, seed.state.clone(), seed.attributes.clone(), Context::new());
        }

        let presence = Arc::new(PresenceEvaluator::new(
            presence_config(config)?,
            states.clone(),
            Arc::new(JsonStore::<PresenceConfig>::new(Storage::new(&config.storage_dir))),
            bus.clone(),
            clock.clone(),
            config.debug,
        ));
        presence.load().await;

        let schedule = Arc::new(ScheduleManager::new(
            Arc::new(JsonStore::<ScheduleDocument>::new(Storage::new(&config.storage_dir))),
            bus.clone(),
        ));
        schedule.load().await;
        for entity_id in &config.tracked_entities {
            schedule
                .add_entity(entity_id)
                .await
                .with_context(|| format!("invalid tracked entity {entity_id}"))?;
        }

        let global = BufferConfig::new(
            config.buffer.time_minutes,
            config.buffer.value_delta,
            config.buffer.enabled,
            config.buffer.applies_to.clone(),
        )?;
        let buffer = Arc::new(BufferManager::new(
            global,
            Arc::new(JsonStore::<BufferDocument>::new(Storage::new(&config.storage_dir))),
            bus.clone(),
            clock.clone(),
            config.debug,
        ));
        buffer.load().await;

        let evaluator = Arc::new(ScheduleEvaluator::new(
            schedule.document(),
            presence.clone(),
            clock,
            config.debug,
        ));
        let coordinator = Arc::new(Coordinator::new(
            presence.clone(),
            evaluator,
            buffer.clone(),
            Arc::new(StateMachineActuator::new(states.clone())),
            bus.clone(),
        ));

        Ok(Self {
            states,
            presence,
            schedule,
            buffer,
            coordinator,
        })
    }
}

fn presence_config(config: &SchedulerConfig) -> Result<PresenceConfig> {
    let section = &config.presence;
    let presence = PresenceConfig {
        entities: section
            .entities
            .iter()
            .map(|id| id.parse())
            .collect::<Result<_, _>>()
            .context("invalid presence entity")?,
        rule: section.rule,
        timeout_seconds: section.timeout_seconds,
        expression: section.expression.clone(),
        force_home_entity: section.force_home_entity.parse()?,
        force_away_entity: section.force_away_entity.parse()?,
    };
    presence.validate_shape()?;
    Ok(presence)
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %path.display(), "Starting climate scheduler");

    let scheduler = ClimateScheduler::build(&config, Arc::new(SystemClock)).await?;
    info!(
        entities = scheduler.schedule.snapshot().entities.len(),
        states = scheduler.states.entity_count(),
        buffer_minutes = scheduler.buffer.global_config().time_minutes,
        mode = %scheduler.presence.get_current_mode(),
        "Climate scheduler initialized"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let coordinator = scheduler.coordinator.clone();
    let interval = Duration::from_secs(config.evaluation_interval_seconds.max(1));
    let runner = tokio::spawn(async move { coordinator.run(interval, shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    if shutdown_tx.send(()).is_err() {
        warn!("Coordinator already stopped");
    }
    runner.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_coordinator::TickOutcome;
    use cs_core::{Mode, MockClock};
    use std::path::Path;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> SchedulerConfig {
        let path = dir.join("climate_scheduler.yaml");
        let yaml = format!("storage_dir: {}\n{body}", dir.display());
        std::fs::write(&path, yaml).unwrap();
        load_config(&path).unwrap()
    }

    #[tokio::test]
    async fn test_build_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(
            temp_dir.path(),
            r#"
presence:
  entities: [person.alex]
tracked_entities: [climate.office]
initial_states:
  - entity_id: person.alex
    state: not_home
  - entity_id: climate.office
    state: heat
    attributes:
      temperature: 19
"#,
        );

        let scheduler = ClimateScheduler::build(&config, Arc::new(MockClock::new()))
            .await
            .unwrap();
        assert_eq!(scheduler.presence.get_current_mode(), Mode::Away);
        assert_eq!(scheduler.states.entity_count(), 2);
        assert_eq!(
            scheduler.coordinator.evaluate_entity("climate.office", false).await,
            TickOutcome::NoSlot
        );
        assert!(temp_dir
            .path()
            .join(".storage")
            .join("climate_scheduler.schedule")
            .exists());
    }

    #[tokio::test]
    async fn test_invalid_presence_entity_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = write_config(temp_dir.path(), "");
        config.presence.entities.push("not an id".to_string());

        assert!(ClimateScheduler::build(&config, Arc::new(SystemClock)).await.is_err());
    }
}
