//! Nullable infrastructure for deterministic testing.
//!
//! All external collaborators of the node (clock, ledger, peers, storage) are
//! abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including failure injection
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod downloader;
pub mod ledger;
pub mod store;

pub use clock::NullClock;
pub use downloader::NullDownloader;
pub use ledger::NullLedger;
pub use store::{NullBundleRepository, NullCheckpointStore};
