//! LMDB implementation of CheckpointStore.

use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env};

use shelter_store::{Checkpoint, CheckpointStore, StoreError};

use crate::LmdbError;

pub struct LmdbCheckpointStore {
    pub(crate) env: Arc<Env>,
    pub(crate) checkpoints_db: Database<Str, Bytes>,
}

impl CheckpointStore for LmdbCheckpointStore {
    fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bytes = self
            .checkpoints_db
            .get(&rtxn, name)
            .map_err(LmdbError::from)?;
        match bytes {
            Some(bytes) => {
                let checkpoint: Checkpoint =
                    bincode::deserialize(bytes).map_err(LmdbError::from)?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let bytes = bincode::serialize(checkpoint).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.checkpoints_db
            .put(&mut wtxn, name, bytes.as_slice())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use shelter_types::Resolution;

    fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).expect("open env");
        (dir, env)
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let (_dir, env) = temp_env();
        let store = env.checkpoint_store();
        assert_eq!(store.load("sheltering").unwrap(), None);
    }

    #[test]
    fn save_then_load_returns_snapshot() {
        let (_dir, env) = temp_env();
        let store = env.checkpoint_store();
        let checkpoint = Checkpoint::new(
            42,
            vec![Resolution::new("bundle-1", 40, 2).with_field("shelterer", "0xaa")],
        );
        store.save("sheltering", &checkpoint).unwrap();

        let loaded = store.load("sheltering").unwrap().expect("checkpoint stored");
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn names_are_independent() {
        let (_dir, env) = temp_env();
        let store = env.checkpoint_store();
        store.save("a", &Checkpoint::new(1, Vec::new())).unwrap();
        store.save("b", &Checkpoint::new(2, Vec::new())).unwrap();
        store.save("a", &Checkpoint::new(3, Vec::new())).unwrap();

        assert_eq!(store.load("a").unwrap().unwrap().last_saved_block, 3);
        assert_eq!(store.load("b").unwrap().unwrap().last_saved_block, 2);
    }

    #[test]
    fn checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
            env.checkpoint_store()
                .save("transfers", &Checkpoint::new(7, Vec::new()))
                .unwrap();
        }
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let loaded = env.checkpoint_store().load("transfers").unwrap();
        assert_eq!(loaded.map(|c| c.last_saved_block), Some(7));
    }

    #[test]
    fn corrupt_value_is_a_serialization_error() {
        let (_dir, env) = temp_env();
        let store = env.checkpoint_store();
        let mut wtxn = store.env.write_txn().unwrap();
        store
            .checkpoints_db
            .put(&mut wtxn, "broken", &[0xffu8][..])
            .unwrap();
        wtxn.commit().unwrap();

        let err = store.load("broken").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
