//! Event-driven communication between daemon services.

use anyhow::Result;
use tokio::sync::broadcast;

use crate::snapshot::DeviceStateSnapshot;

/// Application events published through the [`EventBus`].
///
/// Services stay decoupled by communicating through these instead of
/// calling each other directly.
#[derive(Debug, Clone)]
pub enum Event {
    /// The control tick applied a new duty to the fan output.
    DutyApplied(u8),
    /// The device state snapshot changed (tick or external mutation).
    StateChanged(DeviceStateSnapshot),
    /// An external caller requested daemon shutdown.
    SystemShutdown,
}

/// Publish-subscribe bus backed by a tokio broadcast channel.
///
/// # Example
///
/// ```no_run
/// use fanwarden::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
/// event_bus.publish(Event::DutyApplied(40)).ok();
/// // In async context: let event = subscriber.recv().await;
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Creates a new EventBus with custom capacity.
    #[cfg(test)]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error when no subscriber is listening.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Creates a new subscriber receiving all events published afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
