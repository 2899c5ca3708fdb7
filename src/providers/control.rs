//! Control tick service: the heart of the daemon.

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
    schedule::WeekInstant,
    sensors::SampleSource,
    task_manager::TaskManager,
};

/// Control tick service provider.
///
/// Provides the critical service that periodically evaluates the operating
/// mode against the latest sensor sample and applies the resulting duty to
/// the fan output. Everything the fan actually does originates here.
///
/// # Priority and Criticality
///
/// - **Priority**: 10 (highest)
/// - **Critical**: Yes (the device is inert without it)
pub struct ControlServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ControlServiceProvider {
    /// Creates a new control service provider.
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ControlServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_control_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ControlService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_control_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut interval = interval(Duration::from_secs(u64::from(
        state.config().await.tick_seconds,
    )));

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Control service cancelled");
                break;
            }
            _instant = interval.tick() => {
                evaluate_tick(&state, &event_bus).await;
            }
        }
    }
    Ok(())
}

/// One control tick: read the latest sample, evaluate the active mode
/// under the engine lock, apply the duty to the fan output.
///
/// A tick that fails leaves the previous output in force; the next tick
/// simply tries again with fresh state.
async fn evaluate_tick(state: &Arc<AppState>, event_bus: &EventBus) {
    let sample = state.sample.sample().await;
    let now = WeekInstant::now();

    let (duty, snapshot) = {
        let mut engine = state.engine.lock().await;
        let duty = match engine.tick(sample, now) {
            Ok(duty) => duty,
            Err(e) => {
                log::error!("Tick evaluation failed: {e}");
                return;
            }
        };
        (duty, engine.snapshot())
    };

    if let Err(e) = state.fan.apply_duty(duty).await {
        log::error!("Failed to apply duty {duty}%: {e}");
        return;
    }

    if let Err(e) = event_bus.publish(Event::DutyApplied(duty)) {
        log::debug!("No subscriber for duty event: {e}");
    }
    if let Err(e) = event_bus.publish(Event::StateChanged(snapshot)) {
        log::debug!("No subscriber for state event: {e}");
    }
}
