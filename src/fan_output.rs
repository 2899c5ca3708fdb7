//! Fan output abstraction and backends.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

/// Trait for backends that apply a duty percentage to the physical fan.
///
/// The control tick computes a duty in 0..=100 and hands it here; the
/// backend owns the translation to whatever the hardware expects.
///
/// # Example
///
/// ```no_run
/// use fanwarden::fan_output::FanOutput;
/// use anyhow::Result;
///
/// #[derive(Debug)]
/// struct MockOutput;
///
/// #[async_trait::async_trait]
/// impl FanOutput for MockOutput {
///     async fn apply_duty(&self, _percent: u8) -> Result<()> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait FanOutput: Send + Sync + core::fmt::Debug {
    /// Applies a duty percentage (0..=100) to the fan.
    async fn apply_duty(&self, percent: u8) -> Result<()>;
}

/// Drives a sysfs PWM node. Percent duty is scaled to the 8-bit raw range
/// the kernel interface expects (0..=255).
#[derive(Debug)]
pub struct SysfsPwm {
    path: PathBuf,
}

impl SysfsPwm {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FanOutput for SysfsPwm {
    async fn apply_duty(&self, percent: u8) -> Result<()> {
        let raw = u16::from(percent.min(100)) * 255 / 100;
        std::fs::write(&self.path, raw.to_string())
            .with_context(|| format!("Failed to write pwm node {}", self.path.display()))?;
        debug!("Applied duty {percent}% (raw {raw}) to {}", self.path.display());
        Ok(())
    }
}

/// Fallback backend used when no PWM node is configured. Only logs.
#[derive(Debug, Default)]
pub struct LogOnly;

#[async_trait]
impl FanOutput for LogOnly {
    async fn apply_duty(&self, percent: u8) -> Result<()> {
        debug!("Fan duty {percent}% (no pwm node configured)");
        Ok(())
    }
}
