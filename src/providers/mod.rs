//! Dependency injection providers for service management.
//!
//! Each service of the daemon is created through a provider, keeping
//! construction, priorities and criticality in one place.

pub mod app_state;
pub mod broadcast;
pub mod control;
pub mod dbus;
pub mod traits;

// Re-export core types for convenience
pub use app_state::AppStateProvider;
pub use broadcast::BroadcastServiceProvider;
pub use control::ControlServiceProvider;
pub use dbus::DBusServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
