//! Shared application state for the daemon services.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::{
    arbiter::{ModeArbiter, OperatingMode},
    config::{Config, ConfigManager},
    fan_output::{FanOutput, LogOnly, SysfsPwm},
    schedule::ScheduleStore,
    sensors::SharedSample,
    snapshot::DeviceStateSnapshot,
};

/// Shared application state: configuration, the control engine and its
/// collaborators.
///
/// The engine sits behind a single mutex. Every external mutation and the
/// whole per-tick evaluation take that one lock, so a mutation either fully
/// precedes or fully follows a tick and is visible to the very next one.
pub struct AppState {
    /// Configuration manager doubling as the persistence layer.
    pub config_manager: Arc<ConfigManager>,
    /// The control engine: operating mode, schedule table, duty state.
    pub engine: Arc<Mutex<ModeArbiter>>,
    /// Latest sensor sample, updated out of band.
    pub sample: SharedSample,
    /// Fan output backend driven by the control tick.
    pub fan: Arc<dyn FanOutput>,
}

impl AppState {
    /// Builds the application state, restoring the engine from the
    /// persisted configuration.
    pub async fn new(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let engine = Self::restore_engine(&config)?;

        let fan: Arc<dyn FanOutput> = match &config.pwm_path {
            Some(path) => Arc::new(SysfsPwm::new(path.clone())),
            None => Arc::new(LogOnly),
        };

        Ok(Self {
            config_manager: Arc::new(config_manager),
            engine: Arc::new(Mutex::new(engine)),
            sample: SharedSample::default(),
            fan,
        })
    }

    fn restore_engine(config: &Config) -> Result<ModeArbiter> {
        let mut engine = ModeArbiter::new();

        let mode = OperatingMode::try_from(config.mode)
            .map_err(|e| anyhow::anyhow!("Persisted mode rejected: {e}"))?;
        engine.set_mode(mode);

        engine
            .set_manual_duty(config.manual_duty)
            .map_err(|e| anyhow::anyhow!("Persisted manual duty rejected: {e}"))?;

        engine
            .set_auto_config(config.auto.tmin, config.auto.tmax)
            .map_err(|e| anyhow::anyhow!("Persisted auto bounds rejected: {e}"))?;

        // Registers degrade to defaults individually instead of failing
        // the whole restore; ScheduleStore::restore logs what it drops.
        engine.install_schedule(ScheduleStore::restore(config.registers.iter().copied()));

        Ok(engine)
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    /// Gets the configuration manager.
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Returns the current read model.
    pub async fn snapshot(&self) -> DeviceStateSnapshot {
        self.engine.lock().await.snapshot()
    }

    /// Writes the engine's current control state back into the
    /// configuration and saves it, so mode, duty, bounds and registers
    /// survive a restart.
    pub async fn persist_engine(&self) -> Result<()> {
        let (mode, manual_duty, auto, registers) = {
            let engine = self.engine.lock().await;
            (
                engine.mode().code(),
                engine.manual_duty(),
                engine.auto(),
                engine.schedule().entries().to_vec(),
            )
        };

        {
            let mut config = self.config_manager.get_mut().await;
            config.mode = mode;
            config.manual_duty = manual_duty;
            config.auto = auto;
            config.registers = registers;
        }

        self.config_manager
            .save()
            .await
            .context("Failed to persist control state")
    }
}
