//! Application state provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{app_context::AppState, config::ConfigManager, providers::traits::AsyncProvider};

/// Provider that builds the shared application state, restoring the
/// control engine from the persisted configuration.
pub struct AppStateProvider {
    config_manager: ConfigManager,
}

impl AppStateProvider {
    pub const fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let app_state = AppState::new(self.config_manager.clone()).await?;
        Ok(Arc::new(app_state))
    }
}
