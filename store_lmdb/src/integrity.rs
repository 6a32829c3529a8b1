//! Startup checks for the checkpoint database.
//!
//! A checkpoint that no longer decodes would make its sync engine fail to
//! hydrate on every tick, so the node refuses to start on one instead.

use std::path::Path;

use heed::types::{Bytes, Str};
use heed::{Database, Env};

use shelter_store::Checkpoint;

use crate::LmdbError;

/// Result of scanning every stored checkpoint.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Names of the checkpoints that decoded cleanly.
    pub checkpoints: Vec<String>,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Decode every entry of the checkpoint database. Undecodable entries are
/// reported, not returned as errors; only LMDB failures abort the scan.
pub fn check_integrity(
    env: &Env,
    checkpoints_db: Database<Str, Bytes>,
) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = env.read_txn()?;

    for entry in checkpoints_db.iter(&rtxn)? {
        let (name, bytes) = entry?;
        report.total_entries += 1;
        match bincode::deserialize::<Checkpoint>(bytes) {
            Ok(checkpoint) => {
                tracing::debug!(
                    name,
                    last_saved_block = checkpoint.last_saved_block,
                    records = checkpoint.records.len(),
                    "checkpoint ok"
                );
                report.checkpoints.push(name.to_string());
            }
            Err(e) => report
                .errors
                .push(format!("checkpoint '{name}' does not decode: {e}")),
        }
    }

    Ok(report)
}

/// Refuse a `data_dir` that holds files but no LMDB data file, which
/// usually means the path points somewhere else by mistake. Missing and
/// empty directories are fine.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() || path.join("data.mdb").exists() {
        return Ok(());
    }
    let mut entries =
        std::fs::read_dir(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    match entries.next() {
        None => Ok(()),
        Some(_) => Err(format!(
            "{} is not empty but holds no data.mdb",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use shelter_store::CheckpointStore;

    fn open(dir: &tempfile::TempDir) -> LmdbEnvironment {
        LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap()
    }

    #[test]
    fn missing_and_empty_dirs_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_data_dir(&dir.path().join("absent")).is_ok());
        assert!(check_data_dir(dir.path()).is_ok());
    }

    #[test]
    fn foreign_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        assert!(check_data_dir(dir.path()).is_err());
        assert!(LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).is_err());
    }

    #[test]
    fn stored_checkpoints_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        assert!(env.integrity_report().unwrap().is_healthy());

        let store = env.checkpoint_store();
        store.save("sheltering", &Checkpoint::new(5, Vec::new())).unwrap();
        store.save("transfers", &Checkpoint::new(9, Vec::new())).unwrap();

        let report = env.integrity_report().unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.checkpoints, vec!["sheltering", "transfers"]);
    }

    #[test]
    fn undecodable_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        let store = env.checkpoint_store();
        store.save("sheltering", &Checkpoint::new(5, Vec::new())).unwrap();
        let mut wtxn = store.env.write_txn().unwrap();
        store
            .checkpoints_db
            .put(&mut wtxn, "transfers", &[0xff, 0x01])
            .unwrap();
        wtxn.commit().unwrap();

        let report = env.integrity_report().unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.checkpoints, vec!["sheltering"]);
        assert!(report.errors[0].contains("transfers"));
    }
}
