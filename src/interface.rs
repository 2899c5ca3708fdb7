//! D-Bus interface exposing the control engine to external callers.
//!
//! The six logical operations mirror what the device's web front-end has
//! always called: read the state snapshot, switch mode, set manual duty,
//! set auto bounds, and read/write schedule registers. Payloads are JSON
//! documents with the historical field names.

use std::sync::Arc;

use log::error;
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    arbiter::OperatingMode,
    error::EngineError,
    event::{Event, EventBus},
    schedule::RegisterEntry,
};

pub const OBJECT_PATH: &str = "/io/github/fanwarden";
pub const BUS_NAME: &str = "io.github.fanwarden";

/// Maps engine errors onto distinct D-Bus error names.
///
/// Conflicts travel as `Failed` with the colliding slots in the message,
/// separate from `InvalidArgs`, so callers can highlight the offending
/// register instead of showing a generic validation error.
fn to_fdo(err: EngineError) -> fdo::Error {
    match err {
        EngineError::Conflict { .. } => fdo::Error::Failed(err.to_string()),
        EngineError::NotFound(_) => fdo::Error::UnknownObject(err.to_string()),
        EngineError::Validation(_) | EngineError::InvalidRange | EngineError::OutOfRange(_) => {
            fdo::Error::InvalidArgs(err.to_string())
        }
    }
}

pub struct DBusInterface {
    state: Arc<AppState>,
    event_bus: EventBus,
    version: String,
}

impl DBusInterface {
    pub fn new(state: Arc<AppState>, version: String, event_bus: EventBus) -> Self {
        Self {
            state,
            event_bus,
            version,
        }
    }

    /// Persists the control state after a successful mutation. A failed
    /// save is logged but does not fail the call; the in-memory state is
    /// already authoritative.
    async fn persist(&self) {
        if let Err(e) = self.state.persist_engine().await {
            error!("{e:#}");
        }
    }

    async fn publish_state(&self) {
        let snapshot = self.state.snapshot().await;
        let _ = self.event_bus.publish(Event::StateChanged(snapshot));
    }
}

#[interface(name = "io.github.fanwarden1")]
impl DBusInterface {
    #[zbus(signal)]
    pub async fn state_changed(emitter: &SignalEmitter<'_>, state: String) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> fdo::Result<()> {
        Self::stopped(&emitter).await?;
        if self.event_bus.publish(Event::SystemShutdown).is_err() {
            error!("Shutdown requested but nothing is listening");
        }
        Ok(())
    }

    /// Returns the device state snapshot as JSON.
    async fn get_state(&self) -> fdo::Result<String> {
        let snapshot = self.state.snapshot().await;
        serde_json::to_string(&snapshot).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Switches the operating mode (0=Manual, 1=Auto, 2=Program).
    async fn set_mode(&self, mode: u8) -> fdo::Result<()> {
        let mode = OperatingMode::try_from(mode).map_err(to_fdo)?;
        self.state.engine.lock().await.set_mode(mode);
        self.persist().await;
        self.publish_state().await;
        Ok(())
    }

    /// Stores the manual duty percentage (0..=100).
    async fn set_manual_pwm(&self, duty: u8) -> fdo::Result<()> {
        self.state
            .engine
            .lock()
            .await
            .set_manual_duty(duty)
            .map_err(to_fdo)?;
        self.persist().await;
        self.publish_state().await;
        Ok(())
    }

    /// Stores the auto-mode calibration bounds, `tmin < tmax`.
    async fn set_auto(&self, tmin: f64, tmax: f64) -> fdo::Result<()> {
        self.state
            .engine
            .lock()
            .await
            .set_auto_config(tmin as f32, tmax as f32)
            .map_err(to_fdo)?;
        self.persist().await;
        self.publish_state().await;
        Ok(())
    }

    /// Returns the register in the given slot (1..=3) as JSON.
    async fn get_register(&self, id: u8) -> fdo::Result<String> {
        let entry = self.state.engine.lock().await.register(id).map_err(to_fdo)?;
        serde_json::to_string(&entry).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Validates and stores a full register, JSON-encoded.
    async fn set_register(&self, entry: String) -> fdo::Result<()> {
        let entry: RegisterEntry = serde_json::from_str(&entry)
            .map_err(|e| fdo::Error::InvalidArgs(format!("malformed register payload: {e}")))?;
        self.state
            .engine
            .lock()
            .await
            .set_register(entry)
            .map_err(to_fdo)?;
        self.persist().await;
        self.publish_state().await;
        Ok(())
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}
