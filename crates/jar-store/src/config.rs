//! Data directory and `config.toml`.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};

use jar_core::{GestureConfig, SessionConfig};

use crate::error::{Result, StoreError};
use crate::memory_store::DEFAULT_MAX_BYTES;

/// Overrides the data directory when no explicit path is given.
pub const DATA_DIR_ENV: &str = "VAPORJAR_DATA_DIR";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "jar.db";

pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".vaporjar")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Explicit path, then `VAPORJAR_DATA_DIR`, then `~/.vaporjar`.
pub fn resolve_base_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_base_dir(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL; `/models/{model}:generateContent` is appended.
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JarConfig {
    /// Largest serialized collection the store accepts.
    pub max_bytes: usize,
    pub gesture: GestureConfig,
    pub session: SessionConfig,
    pub oracle: OracleConfig,
}

impl Default for JarConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            gesture: GestureConfig::default(),
            session: SessionConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl JarConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StoreError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        toml::from_str(&text)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }
}
