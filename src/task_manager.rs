//! Lifecycle management for the daemon's background tasks.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervises named async tasks and shuts them down gracefully.
///
/// Each task receives a child token of the global cancellation token;
/// cancelling the global token asks every task to wind down.
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    pub global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a task under the given name.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(task_token_clone).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e}");
                    Err(e)
                }
            }
        });

        self.tasks.insert(
            name,
            TaskInfo {
                handle,
                cancel_token: task_token,
            },
        );

        Ok(())
    }

    /// Cancels every task and waits for completion, bounded by a timeout
    /// per task. Returns the first error encountered, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        let handles: Vec<_> = self.tasks.drain().map(|(_, info)| info.handle).collect();

        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task failed during shutdown: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    let error = anyhow::anyhow!("Task panicked: {e}");
                    error!("{error}");
                    first_error.get_or_insert(error);
                }
                Err(_) => {
                    let error = anyhow::anyhow!("Task shutdown timeout exceeded");
                    error!("{error}");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    /// Returns the count of active tasks.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Checks whether a task with the given name is currently registered.
    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
    #[allow(dead_code)] // Per-task cancellation is reserved for future use
    cancel_token: CancellationToken,
}
