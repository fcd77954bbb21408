//! Protocols saved as JSON files, one [`ProtocolRequest`] per file.
//!
//! Writes go through a temp file in the storage directory followed by a
//! rename, so a protocol file is either the old or the new content, never a
//! partial write.

use crate::error::storage::StorageError;
use crate::message::ProtocolRequest;

use common::ErrorLocation;

use std::fs;
use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{error, info, warn};
use tempfile::Builder as TempFileBuilder;

const STORAGE_DIR_NAME: &str = ".reyer";
const PROTOCOLS_DIR_NAME: &str = "protocols";
const PROTOCOL_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".tmp_";

/// How a saved protocol file is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileName {
    /// `{sanitised name}_{YYYYMMDD_HHMMSS}.json`, timestamp in UTC.
    Auto,
    /// Used as given, inside the storage directory.
    Custom(String),
}

/// Listing entry for a stored protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSummary {
    pub name: String,
    pub participant_id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub modified_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ProtocolStorage {
    storage_dir: PathBuf,
}

impl ProtocolStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.into();

        fs::create_dir_all(&storage_dir).map_err(|e| {
            error!(
                "Failed to create storage directory {}: {e}",
                storage_dir.display()
            );
            StorageError::Directory {
                location: ErrorLocation::from(Location::caller()),
                path: storage_dir.clone(),
                source: e,
            }
        })?;

        info!("Protocol storage directory: {}", storage_dir.display());
        Ok(Self { storage_dir })
    }

    /// `~/.reyer/protocols`, if the platform has a home directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(STORAGE_DIR_NAME).join(PROTOCOLS_DIR_NAME))
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Save `protocol`, replacing any file of the same name. Returns its path.
    pub fn save(
        &self,
        protocol: &ProtocolRequest,
        file_name: FileName,
    ) -> Result<PathBuf, StorageError> {
        let file_name = match file_name {
            FileName::Auto => auto_file_name(&protocol.name, SystemTime::now()),
            FileName::Custom(name) => name,
        };
        let path = self.storage_dir.join(file_name);

        let contents =
            serde_json::to_vec_pretty(protocol).map_err(|e| StorageError::Serialize {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            })?;

        let mut temp = TempFileBuilder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".json")
            .tempfile_in(&self.storage_dir)
            .map_err(|e| StorageError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: self.storage_dir.clone(),
                source: e,
            })?;

        temp.write_all(&contents).map_err(|e| StorageError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: temp.path().to_path_buf(),
            source: e,
        })?;

        temp.persist(&path).map_err(|e| {
            error!("Failed to save protocol to {}: {}", path.display(), e.error);
            StorageError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: path.clone(),
                source: e.error,
            }
        })?;

        info!("Protocol saved: {}", path.display());
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<ProtocolRequest, StorageError> {
        if !path.exists() {
            return Err(StorageError::NotFound {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
            });
        }

        let contents = fs::read(path).map_err(|e| StorageError::Read {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let protocol: ProtocolRequest =
            serde_json::from_slice(&contents).map_err(|e| StorageError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!("Protocol loaded: {} from {}", protocol.name, path.display());
        Ok(protocol)
    }

    /// Every readable protocol in the directory, most recently modified first.
    ///
    /// Files that fail to load are skipped with a warning.
    pub fn list(&self) -> Result<Vec<ProtocolSummary>, StorageError> {
        let entries = fs::read_dir(&self.storage_dir).map_err(|e| StorageError::Directory {
            location: ErrorLocation::from(Location::caller()),
            path: self.storage_dir.clone(),
            source: e,
        })?;

        let mut protocols = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_protocol_file(&path) {
                continue;
            }

            let modified_at = match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified_at) => modified_at,
                Err(e) => {
                    warn!("Skipping protocol file {}: {e}", path.display());
                    continue;
                }
            };

            match self.load(&path) {
                Ok(protocol) => protocols.push(ProtocolSummary {
                    name: protocol.name,
                    participant_id: protocol.participant_id,
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                    modified_at,
                }),
                Err(e) => warn!("Skipping invalid protocol file {}: {e}", path.display()),
            }
        }

        protocols.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(protocols)
    }

    pub fn delete(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            warn!("Protocol file not found: {}", path.display());
            return Err(StorageError::NotFound {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
            });
        }

        fs::remove_file(path).map_err(|e| StorageError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        info!("Protocol deleted: {}", path.display());
        Ok(())
    }
}

fn is_protocol_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));

    !hidden && path.is_file() && path.extension().is_some_and(|ext| ext == PROTOCOL_EXTENSION)
}

/// Replace everything but ASCII alphanumerics, `-` and `_` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn auto_file_name(name: &str, now: SystemTime) -> String {
    // "2026-10-16T09:05:03Z" -> "20261016_090503"
    let digits: String = humantime::format_rfc3339_seconds(now)
        .to_string()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let (date, time) = digits.split_at(digits.len().min(8));

    format!(
        "{}_{date}_{time}.{PROTOCOL_EXTENSION}",
        sanitize_name(name)
    )
}
