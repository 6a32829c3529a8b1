//! Top-level error type shared across crates.

use thiserror::Error;

/// Failure to read a shared record out of raw ledger data.
#[derive(Debug, Error)]
pub enum ShelterError {
    #[error("event is missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` has invalid value `{value}`")]
    InvalidField { field: String, value: String },
}
