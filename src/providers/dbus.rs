//! D-Bus service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    interface::{BUS_NAME, DBusInterface, OBJECT_PATH},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// D-Bus service provider for external control.
///
/// Serves the control interface on the session bus so external callers can
/// read the device state, switch modes and edit schedule registers. State
/// change events from the bus side are forwarded as D-Bus signals.
///
/// # Priority and Criticality
///
/// - **Priority**: 8 (high)
/// - **Critical**: Yes, when a session bus exists; the coordinator skips
///   the service entirely when connecting fails at creation time.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Creates a new D-Bus service provider with a session bus connection.
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session().await?;
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(state, event_bus, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// Serves the control interface until cancelled, forwarding state change
/// events as D-Bus signals along the way.
async fn run_dbus_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let interface = DBusInterface::new(
        state,
        env!("CARGO_PKG_VERSION").to_string(),
        event_bus.clone(),
    );
    connection
        .object_server()
        .at(OBJECT_PATH, interface)
        .await?;

    connection.request_name(BUS_NAME).await?;

    let mut event_rx = event_bus.subscribe();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Ok(Event::StateChanged(snapshot)) => {
                        if let Ok(json) = serde_json::to_string(&snapshot) {
                            forward_state_signal(&connection, json).await;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("D-Bus signal forwarder lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        anyhow::bail!("Event bus closed unexpectedly");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn forward_state_signal(connection: &Connection, json: String) {
    match connection
        .object_server()
        .interface::<_, DBusInterface>(OBJECT_PATH)
        .await
    {
        Ok(iface) => {
            if let Err(e) = DBusInterface::state_changed(iface.signal_emitter(), json).await {
                log::warn!("Failed to emit state signal: {e}");
            }
        }
        Err(e) => log::warn!("Failed to resolve interface for signal: {e}"),
    }
}
