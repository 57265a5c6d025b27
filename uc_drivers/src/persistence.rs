//! Driver set persistence.
//!
//! The loaded driver set (ids, module names, configs) is stored as a JSON
//! snapshot in the runtime directory:
//!
//! ```json
//! {"phi": [{"id": "relay1", "mod": "vrtrelay", "cfg": {}}],
//!  "lpi": [{"lpi_id": "basic", "mod": "basic", "phi_id": "relay1", "cfg": {}}]}
//! ```

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uc_common::driver::{DriverError, StateMap};

/// Persisted PHI entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhiEntry {
    /// PHI id.
    pub id: String,
    /// Module name.
    #[serde(rename = "mod")]
    pub module: String,
    /// Instance configuration.
    #[serde(default)]
    pub cfg: StateMap,
}

/// Persisted LPI entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LpiEntry {
    /// LPI id.
    pub lpi_id: String,
    /// Module name.
    #[serde(rename = "mod")]
    pub module: String,
    /// Id of the bound PHI.
    pub phi_id: String,
    /// Instance configuration.
    #[serde(default)]
    pub cfg: StateMap,
}

/// Persisted driver set.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    /// PHI entries.
    #[serde(default)]
    pub phi: Vec<PhiEntry>,
    /// LPI entries.
    #[serde(default)]
    pub lpi: Vec<LpiEntry>,
}

impl Snapshot {
    /// Whether the snapshot holds no drivers.
    pub fn is_empty(&self) -> bool {
        self.phi.is_empty() && self.lpi.is_empty()
    }
}

/// Snapshot file manager.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot`, creating parent directories if needed.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), DriverError> {
        debug!("Saving driver snapshot to {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DriverError::Persistence(format!("Failed to create directory: {e}"))
            })?;
        }

        let file = File::create(&self.path).map_err(|e| {
            DriverError::Persistence(format!("Failed to create snapshot file: {e}"))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| {
            DriverError::Persistence(format!("Failed to serialize snapshot: {e}"))
        })?;
        writer
            .flush()
            .map_err(|e| DriverError::Persistence(format!("Failed to write snapshot: {e}")))?;

        info!(
            "Saved {} PHI / {} LPI entries to {:?}",
            snapshot.phi.len(),
            snapshot.lpi.len(),
            self.path
        );
        Ok(())
    }

    /// Read the snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Snapshot>, DriverError> {
        debug!("Loading driver snapshot from {:?}", self.path);

        if !self.path.exists() {
            debug!("Snapshot file does not exist, starting fresh");
            return Ok(None);
        }

        let file = File::open(&self.path).map_err(|e| {
            DriverError::Persistence(format!("Failed to open snapshot file: {e}"))
        })?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            DriverError::Persistence(format!("Failed to deserialize snapshot: {e}"))
        })?;

        info!(
            "Loaded {} PHI / {} LPI entries from {:?}",
            snapshot.phi.len(),
            snapshot.lpi.len(),
            self.path
        );
        Ok(Some(snapshot))
    }

    /// Delete the snapshot file.
    pub fn delete(&self) -> Result<(), DriverError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                DriverError::Persistence(format!("Failed to delete snapshot file: {e}"))
            })?;
            info!("Deleted snapshot file {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        Snapshot {
            phi: vec![PhiEntry {
                id: "relay1".to_string(),
                module: "vrtrelay".to_string(),
                cfg: json!({"default_status": 0}).as_object().cloned().unwrap(),
            }],
            lpi: vec![LpiEntry {
                lpi_id: "basic".to_string(),
                module: "basic".to_string(),
                phi_id: "relay1".to_string(),
                cfg: StateMap::new(),
            }],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/uc_drivers.json"));

        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_file_shape() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("uc_drivers.json"));
        store.save(&sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["phi"][0], json!({"id": "relay1", "mod": "vrtrelay", "cfg": {"default_status": 0}}));
        assert_eq!(
            raw["lpi"][0],
            json!({"lpi_id": "basic", "mod": "basic", "phi_id": "relay1", "cfg": {}})
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
        assert!(store.delete().is_ok());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("uc_drivers.json");
        fs::write(&path, "{not json").unwrap();
        let store = SnapshotStore::new(&path);
        assert!(matches!(store.load(), Err(DriverError::Persistence(_))));
    }

    #[test]
    fn test_missing_sections_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("uc_drivers.json");
        fs::write(&path, r#"{"phi": [{"id": "s1", "mod": "vrtsensors"}]}"#).unwrap();
        let loaded = SnapshotStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.phi[0].cfg, StateMap::new());
        assert!(loaded.lpi.is_empty());
        assert!(!loaded.is_empty());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("uc_drivers.json"));
        store.save(&Snapshot::default()).unwrap();
        assert!(store.path().exists());
        store.delete().unwrap();
        assert!(!store.path().exists());
    }
}
