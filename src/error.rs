//! Typed errors for the fan control engine.

use thiserror::Error;

/// Errors produced by the control engine and its schedule store.
///
/// `Conflict` is deliberately separate from `Validation`: callers react
/// differently to the two (highlight the colliding slot vs. show a generic
/// field error), so they must stay distinguishable across the wire.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Malformed field values: hour/minute out of range, day bits above
    /// 0x7F, or temperature bounds that are not strictly increasing.
    #[error("invalid field: {0}")]
    Validation(String),

    /// The submitted window overlaps one or more active registers on a
    /// shared weekday. Carries every colliding slot id.
    #[error("window overlaps active register(s) {slots:?}")]
    Conflict { slots: Vec<u8> },

    /// Unknown register slot id (valid ids are 1..=3).
    #[error("no register slot {0}")]
    NotFound(u8),

    /// Degenerate interpolation bounds reached the duty computation.
    /// Upstream validation keeps this unreachable in normal operation.
    #[error("temperature bounds must satisfy min < max")]
    InvalidRange,

    /// Manual duty outside 0..=100 percent.
    #[error("duty {0} outside 0..=100")]
    OutOfRange(u8),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
