//! Snapshot persistence
//!
//! The whole node state lives in one file. Writes go to a sibling temporary file that is then
//! renamed over the target, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::path::{Path, PathBuf};

use did_ledger::StateSnapshot;
use tracing::{debug, info};

use crate::error::{NodeError, Result};

/// On-disk encoding, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Bincode,
    Json,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Bincode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = SnapshotFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the snapshot, or `None` when nothing has been saved yet
    pub fn load(&self) -> Result<Option<StateSnapshot>> {
        if !self.path.exists() {
            debug!("No snapshot at {}", self.path.display());
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let snapshot = match self.format {
            SnapshotFormat::Json => serde_json::from_slice(&bytes)?,
            SnapshotFormat::Bincode => bincode::deserialize(&bytes)?,
        };
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = match self.format {
            SnapshotFormat::Json => serde_json::to_vec_pretty(snapshot)?,
            SnapshotFormat::Bincode => bincode::serialize(snapshot)?,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path()?;
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;

        info!(
            "Saved snapshot to {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let name = self.path.file_name().ok_or_else(|| {
            NodeError::Storage(format!(
                "snapshot path {} has no file name",
                self.path.display()
            ))
        })?;
        let mut tmp_name = name.to_os_string();
        tmp_name.push(".tmp");
        Ok(self.path.with_file_name(tmp_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(
            SnapshotStore::new("state.json").format(),
            SnapshotFormat::Json
        );
        assert_eq!(
            SnapshotStore::new("state.JSON").format(),
            SnapshotFormat::Json
        );
        assert_eq!(
            SnapshotStore::new("state.snapshot").format(),
            SnapshotFormat::Bincode
        );
        assert_eq!(SnapshotStore::new("state").format(), SnapshotFormat::Bincode);
    }

    #[test]
    fn test_temp_path_sits_next_to_target() {
        let store = SnapshotStore::new("data/state.json");
        assert_eq!(
            store.temp_path().unwrap(),
            PathBuf::from("data/state.json.tmp")
        );
        assert!(SnapshotStore::new("/").temp_path().is_err());
    }
}
