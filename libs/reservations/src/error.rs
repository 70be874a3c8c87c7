//! Error types for reservation construction.

use thiserror::Error;

/// Errors that can occur when building a reservation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// The expiry could not be interpreted as an instant or a duration.
    #[error("invalid expiry value: '{value}'")]
    InvalidExpiry { value: String },

    /// The expiry resolves to an instant outside the representable range.
    #[error("expiry out of range: {0}")]
    OutOfRange(String),
}

impl ReservationError {
    pub(crate) fn invalid(value: impl ToString) -> Self {
        Self::InvalidExpiry {
            value: value.to_string(),
        }
    }

    /// Returns true if the expiry representation itself was rejected.
    pub fn is_invalid_expiry(&self) -> bool {
        matches!(self, Self::InvalidExpiry { .. })
    }
}
