//! Abstract storage traits for the shelter node.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The sync engines and workers depend only on the traits.

pub mod bundle;
pub mod checkpoint;
pub mod error;

pub use bundle::{BundleContent, BundleEntry, BundlePayload, BundleRepository, EntryKind};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::StoreError;
