use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One reading from the device sensors: temperature plus room presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub temperature: f32,
    pub presence: bool,
}

impl Default for SensorSample {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            presence: false,
        }
    }
}

#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Returns the most recent sample without blocking on hardware.
    async fn sample(&self) -> SensorSample;
}

/// Latest-value cell updated out of band by a sensor collaborator.
/// A failed driver read simply leaves the previous value in place.
#[derive(Debug, Clone, Default)]
pub struct SharedSample(Arc<RwLock<SensorSample>>);

impl SharedSample {
    pub fn new(initial: SensorSample) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub async fn publish(&self, sample: SensorSample) {
        *self.0.write().await = sample;
    }
}

#[async_trait]
impl SampleSource for SharedSample {
    async fn sample(&self) -> SensorSample {
        *self.0.read().await
    }
}
