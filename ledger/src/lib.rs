//! Ledger and peer interfaces.
//!
//! The node never talks to the ledger or to peers directly; it goes through
//! these traits. Production implementations wrap an RPC client and the
//! peer-to-peer downloader, tests use `shelter-nullables`.

pub mod contract;
pub mod downloader;
pub mod error;
pub mod events;

pub use contract::ShelteringContract;
pub use downloader::BundleDownloader;
pub use error::LedgerError;
pub use events::{EventKind, LedgerEventSource, RawEvent};
