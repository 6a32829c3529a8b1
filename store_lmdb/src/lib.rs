//! LMDB storage backend for the shelter node.
//!
//! Implements [`shelter_store::CheckpointStore`] using the `heed` LMDB
//! bindings. Checkpoints live in a single named database inside one
//! environment, encoded with `bincode`.

pub mod checkpoint;
pub mod environment;
pub mod error;
pub mod integrity;

pub use checkpoint::LmdbCheckpointStore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
