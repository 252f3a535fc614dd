use std::fs;
use std::path::Path;

use jar_core::{MemoryCollection, export_json, import_json};

use crate::error::{Result, StoreError};
use crate::memory_store::MemoryStore;

impl MemoryStore {
    /// Replace the collection with the contents of an export file.
    /// Returns the number of memories imported.
    pub fn import_json_file(&mut self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    pub fn import_json_str(&mut self, json: &str) -> Result<usize> {
        let collection: MemoryCollection =
            import_json(json).map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))?;
        let n = collection.len();
        self.replace_all(collection)?;
        Ok(n)
    }

    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self) -> Result<String> {
        export_json(self.collection())
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }
}
