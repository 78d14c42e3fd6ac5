//! Local persistence: the whole note collection in one key of the embedded db.
//!
//! Reads and writes never fail from the caller's point of view. A missing or
//! corrupt slot reads as an empty collection and write errors are only logged.

use crate::error::Result;
use crate::models::Note;

/// Key of the slot holding the serialized collection.
pub const LOCAL_SLOT: &str = "smarkdown_notes";

#[derive(Clone)]
pub struct LocalStore {
    db: sled::Db,
}

impl LocalStore {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    pub fn read_all(&self) -> Vec<Note> {
        match self.try_read_all() {
            Ok(notes) => notes,
            Err(e) => {
                log::error!("Failed to load local notes: {}", e);
                Vec::new()
            }
        }
    }

    pub fn write_all(&self, notes: &[Note]) {
        if let Err(e) = self.try_write_all(notes) {
            log::error!("Failed to save local notes: {}", e);
        }
    }

    fn try_read_all(&self) -> Result<Vec<Note>> {
        match self.db.get(LOCAL_SLOT)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn try_write_all(&self, notes: &[Note]) -> Result<()> {
        let bytes = serde_json::to_vec(notes)?;
        self.db.insert(LOCAL_SLOT, bytes)?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    (dir, LocalStore::new(db))
}
