use thiserror::Error;

use shelter_ledger::LedgerError;
use shelter_store::StoreError;
use shelter_types::{ShelterError, TransferId};

/// Failure of a single sync cycle. The cycle is abandoned as a whole: the
/// cache and checkpoint keep their pre-cycle values.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("malformed {kind} event: {source}")]
    MalformedEvent {
        kind: &'static str,
        #[source]
        source: ShelterError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transfer {transfer_id} cannot be resolved yet")]
    CannotResolve { transfer_id: TransferId },

    #[error("resolution {id} is missing `{field}`")]
    MalformedResolution { id: String, field: &'static str },

    #[error("donor returned bundle {received} instead of {expected}")]
    BundleMismatch { expected: String, received: String },

    #[error("config error: {0}")]
    Config(String),
}
