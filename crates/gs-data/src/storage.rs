use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use gs_types::{GsResult, PersistenceError};

use crate::columnar::{read_parquet, write_parquet};
use crate::snapshot::StoreSnapshot;

/// What to do when the target file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveMode {
    /// Fail with `FileExists`
    CreateNew,
    /// Replace the existing file
    Overwrite,
}

/// On-disk encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageFormat {
    Json,
    Parquet,
}

impl StorageFormat {
    pub const SUPPORTED_EXTENSIONS: [&'static str; 2] = ["json", "parquet"];

    pub fn from_path(path: &Path) -> GsResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            _ => Err(PersistenceError::UnsupportedFormat {
                extension: if extension.is_empty() {
                    format!("{} has no extension", path.display())
                } else {
                    format!(".{extension} (supported: .json, .parquet)")
                },
            }
            .into()),
        }
    }
}

/// Loads and saves cell store snapshots
pub trait PersistenceAdapter: Send + Sync {
    /// `None` when nothing has been saved at `path` yet
    fn load(&self, path: &Path) -> GsResult<Option<StoreSnapshot>>;

    fn save(&self, snapshot: &StoreSnapshot, path: &Path, mode: SaveMode) -> GsResult<()>;
}

/// File based adapter supporting JSON and Parquet
#[derive(Debug, Default, Clone)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        Self
    }

    /// Sibling path the snapshot is written to before it replaces `path`
    fn staging_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.partial"))
    }
}

impl PersistenceAdapter for FileStorage {
    fn load(&self, path: &Path) -> GsResult<Option<StoreSnapshot>> {
        let format = StorageFormat::from_path(path)?;
        if !path.exists() {
            return Ok(None);
        }
        let snapshot = match format {
            StorageFormat::Json => serde_json::from_slice(&fs::read(path)?)?,
            StorageFormat::Parquet => read_parquet(path)?,
        };
        debug!(path = %path.display(), "Loaded sweep snapshot");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &StoreSnapshot, path: &Path, mode: SaveMode) -> GsResult<()> {
        let format = StorageFormat::from_path(path)?;
        if mode == SaveMode::CreateNew && path.exists() {
            return Err(PersistenceError::FileExists {
                path: path.display().to_string(),
            }
            .into());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = Self::staging_path(path);
        match format {
            StorageFormat::Json => fs::write(&staging, serde_json::to_vec_pretty(snapshot)?)?,
            StorageFormat::Parquet => write_parquet(snapshot, &staging)?,
        }
        fs::rename(&staging, path)?;
        debug!(path = %path.display(), cells = snapshot.cells.len(), "Saved sweep snapshot");
        Ok(())
    }
}
