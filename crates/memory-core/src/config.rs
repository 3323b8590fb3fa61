//! Explicit construction configuration.
//!
//! The database path is a construction parameter, not ambient global state
//! (design notes §9) — callers decide where the store lives and pass it in.

use std::path::PathBuf;

use crate::error::{MemoryError, Result};

/// Configuration for opening a [`crate::storage::Store`].
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Resolves the default location under the user's home directory:
    /// `~/.copilot-mcp/memory/unified.db`.
    pub fn default_for_home() -> Result<Self> {
        let base_dirs = directories::BaseDirs::new().ok_or_else(|| {
            MemoryError::Validation("could not determine home directory".to_string())
        })?;
        let data_dir = base_dirs.home_dir().join(".copilot-mcp").join("memory");
        std::fs::create_dir_all(&data_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(&data_dir, perms);
        }
        Ok(Self {
            db_path: data_dir.join("unified.db"),
        })
    }
}
