//! System coordinator for service lifecycle management.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, BroadcastServiceProvider, ControlServiceProvider,
        DBusServiceProvider, ServiceProvider,
    },
    task_manager::TaskManager,
};

/// Coordinates initialization, startup and shutdown of every daemon
/// service through the provider registry.
///
/// Critical services must start; non-critical ones may fail and only get
/// logged. The main loop multiplexes Ctrl-C with bus events until a
/// shutdown is requested.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Builds the shared state from configuration and registers the
    /// service providers.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let app_state_provider = AppStateProvider::new(config_manager);
        let state = app_state_provider
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        self.register_service_providers(state).await;

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![Box::new(
            ControlServiceProvider::new(state.clone(), self.event_bus.clone()),
        )];

        if state.config().await.enable_broadcast {
            providers.push(Box::new(BroadcastServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )));
        }

        match DBusServiceProvider::new(state, self.event_bus.clone()).await {
            Ok(provider) => providers.push(Box::new(provider)),
            Err(e) => {
                log::warn!("Failed to create D-Bus service provider: {e}, skipping D-Bus service");
            }
        }

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        provider.is_critical()
                    );
                }
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    log::warn!(
                        "Non-critical service '{}' failed to start: {e}",
                        provider.name()
                    );
                }
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Main event loop: runs until Ctrl-C or a shutdown event arrives.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            info!("Received Ctrl+C, initiating graceful shutdown...");
                            self.shutdown().await
                                .context("Failed to shutdown gracefully after Ctrl+C")?;
                            break;
                        }
                        Err(e) => {
                            bail!("Failed to listen for shutdown signal: {e}");
                        }
                    }
                }

                event = event_rx.recv() => {
                    if !self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        info!("Main event loop terminated");
        Ok(())
    }

    /// Handles one bus event; returns false when the loop should stop.
    async fn handle_event(
        &mut self,
        event_result: Result<Event, tokio::sync::broadcast::error::RecvError>,
    ) -> Result<bool> {
        match event_result {
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested over the bus");
                self.shutdown()
                    .await
                    .context("Failed to shutdown gracefully after shutdown request")?;
                Ok(false)
            }
            Ok(event) => {
                log::debug!("Event: {event:?}");
                Ok(true)
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Event bus channel closed unexpectedly");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event bus lagged by {n} messages");
                Ok(true)
            }
        }
    }

    /// Performs graceful shutdown of all services.
    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {e}");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Returns a reference to the EventBus for testing purposes.
    #[allow(dead_code)]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
