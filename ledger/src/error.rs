use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger RPC failed: {0}")]
    Rpc(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("download from {donor} failed: {reason}")]
    Download { donor: String, reason: String },
}
