use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Base trait for providers that create components asynchronously.
///
/// # Example
///
/// ```no_run
/// use fanwarden::providers::traits::AsyncProvider;
///
/// struct ConfigProvider;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for ConfigProvider {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("config data".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// Trait for services started through the TaskManager.
///
/// Services declare a priority (higher starts first) and whether they are
/// critical; a failing critical service aborts startup, a failing
/// non-critical one is only logged.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Starts the service in TaskManager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Returns service name for logging and management.
    fn name(&self) -> &'static str;

    /// Returns startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Indicates whether the service is critical for system operation.
    fn is_critical(&self) -> bool {
        false
    }
}
