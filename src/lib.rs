//! # fanwarden
//!
//! A daemon for a network-connected fan controller: closed-loop
//! temperature-driven PWM control with weekly schedule arbitration.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio
//! - **Three Operating Modes**: Manual duty, temperature-proportional Auto,
//!   and schedule-driven Program mode
//! - **Schedule Registers**: Three weekly recurring windows with conflict
//!   detection across shared weekdays
//! - **Hysteresis**: Deadband on the interpolated duty to protect the motor
//!   from PWM chatter
//! - **D-Bus Interface**: External control and state signals
//! - **Persistent State**: Mode, duty, bounds and registers survive restarts
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - [`ModeArbiter`](arbiter::ModeArbiter) - The control engine behind one lock
//!
//! ## Example
//!
//! ```no_run
//! use fanwarden::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod arbiter;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod duty_curve;
pub mod error;
pub mod event;
pub mod fan_output;
pub mod interface;
pub mod providers;
pub mod schedule;
pub mod sensors;
pub mod snapshot;
pub mod task_manager;
