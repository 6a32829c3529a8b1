//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use crate::checkpoint::LmdbCheckpointStore;
use crate::integrity::{check_data_dir, check_integrity, IntegrityReport};
use crate::LmdbError;

pub(crate) const CHECKPOINTS_DB: &str = "checkpoints";

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    checkpoints_db: Database<Str, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        check_data_dir(path).map_err(LmdbError::DataDir)?;
        std::fs::create_dir_all(path).map_err(|e| LmdbError::DataDir(e.to_string()))?;

        // SAFETY: the environment is opened once per path by this process and
        // the map is never accessed through other handles.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let checkpoints_db: Database<Str, Bytes> =
            env.create_database(&mut wtxn, Some(CHECKPOINTS_DB))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            checkpoints_db,
        })
    }

    /// Checkpoint store backed by this environment.
    pub fn checkpoint_store(&self) -> LmdbCheckpointStore {
        LmdbCheckpointStore {
            env: Arc::clone(&self.env),
            checkpoints_db: self.checkpoints_db,
        }
    }

    /// Decode every stored checkpoint; see [`check_integrity`].
    pub fn integrity_report(&self) -> Result<IntegrityReport, LmdbError> {
        check_integrity(&self.env, self.checkpoints_db)
    }
}
