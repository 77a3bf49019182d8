//! Profile list persistence
//!
//! The registry lives on disk as one JSON array, order-preserving, at
//! `<config_dir>/region-mirror/profiles.json`. An absent file is an empty
//! list, not an error; a malformed file comes back as a typed error so
//! the caller can warn once and continue with an empty list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::config;
use crate::profile::Profile;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read profile list from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("profile list at {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode profile list")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write profile list to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle on the on-disk profile list.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Store at the default per-user location.
    pub fn default_location() -> Self {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::PROFILES_FILENAME);
        Self::at_path(path)
    }

    /// Store at an explicit path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the profile list. Out-of-range numeric fields are clamped on
    /// the way in.
    pub fn load(&self) -> Result<Vec<Profile>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no profile list on disk, starting empty");
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let mut profiles: Vec<Profile> =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        for profile in &mut profiles {
            profile.validate_and_clamp();
        }
        info!(count = profiles.len(), path = %self.path.display(), "loaded profile list");
        Ok(profiles)
    }

    /// Write the whole list back, creating the parent directory on demand.
    pub fn save(&self, profiles: &[Profile]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(profiles)
            .map_err(|source| StoreError::Encode { source })?;
        fs::write(&self.path, json).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(count = profiles.len(), path = %self.path.display(), "saved profile list");
        Ok(())
    }
}
