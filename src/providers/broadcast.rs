//! Periodic state broadcast service.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    snapshot::DeviceStateSnapshot,
    task_manager::TaskManager,
};

/// Minimum temperature movement, in °C, that counts as a state change.
const TEMPERATURE_EPSILON: f32 = 0.2;

/// State broadcast service provider.
///
/// Provides a non-critical service that republishes the device snapshot at
/// the configured broadcast interval whenever it changed materially since
/// the last emission. External monitors get a steady feed without polling
/// the engine themselves.
///
/// # Priority and Criticality
///
/// - **Priority**: 3 (low)
/// - **Critical**: No (optional service)
pub struct BroadcastServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl BroadcastServiceProvider {
    /// Creates a new broadcast service provider.
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for BroadcastServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_broadcast_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "BroadcastService"
    }

    fn priority(&self) -> i32 {
        3
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Whether two snapshots differ enough to be worth re-broadcasting.
fn changed_materially(previous: &DeviceStateSnapshot, current: &DeviceStateSnapshot) -> bool {
    (current.temperature - previous.temperature).abs() >= TEMPERATURE_EPSILON
        || current.presence != previous.presence
        || current.pwm != previous.pwm
        || current.mode != previous.mode
        || current.tmin != previous.tmin
        || current.tmax != previous.tmax
}

async fn run_broadcast_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut interval = interval(Duration::from_secs(u64::from(
        state.config().await.broadcast_interval,
    )));
    let mut last_sent: Option<DeviceStateSnapshot> = None;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Broadcast service cancelled");
                break;
            }
            _instant = interval.tick() => {
                let snapshot = state.snapshot().await;
                let should_send = last_sent
                    .as_ref()
                    .is_none_or(|prev| changed_materially(prev, &snapshot));

                if should_send {
                    if let Err(e) = event_bus.publish(Event::StateChanged(snapshot)) {
                        log::debug!("No subscriber for broadcast: {e}");
                    }
                    last_sent = Some(snapshot);
                }
            }
        }
    }
    Ok(())
}
