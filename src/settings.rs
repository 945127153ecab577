//! Host settings access: the narrow capability the pipeline reads its
//! credential and model preferences through.
//!
//! The host application decides where settings live. `JsonSettingsStore` is
//! the file-backed source used when the assistant runs outside a host that
//! provides its own; `MemorySettings` backs tests and embedders that resolve
//! settings themselves.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Model preferences as persisted by the host. Every field is optional;
/// `config::SessionConfig::load` fills gaps with defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Errors from reading or writing persisted settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Internal lock error")]
    LockPoisoned,
}

/// Read-only view of the host's persisted settings.
pub trait SettingsSource: Send + Sync {
    /// Persisted API credential, if the user entered one.
    fn credential(&self) -> Option<String>;

    /// Persisted model preferences.
    fn model_config(&self) -> ModelSettings;
}

// ═══════════════════════════════════════════════════════════
// JsonSettingsStore
// ═══════════════════════════════════════════════════════════

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default)]
    model: ModelSettings,
}

/// Settings persisted as JSON, loaded once at construction.
///
/// A missing file is not an error: it reads as "nothing configured".
pub struct JsonSettingsStore {
    path: PathBuf,
    contents: RwLock<SettingsFile>,
}

impl JsonSettingsStore {
    /// Load settings from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let contents = read_settings_file(&path)?;
        tracing::debug!(path = %path.display(), "Settings loaded");
        Ok(Self {
            path,
            contents: RwLock::new(contents),
        })
    }

    /// Load from the default location under the app data directory.
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load(crate::config::settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a credential and write the file back.
    pub fn set_credential(&self, credential: &str) -> Result<(), SettingsError> {
        let mut guard = self
            .contents
            .write()
            .map_err(|_| SettingsError::LockPoisoned)?;
        guard.api_key = Some(credential.to_string());
        self.persist(&guard)
    }

    /// Store model preferences and write the file back.
    pub fn set_model_config(&self, model: ModelSettings) -> Result<(), SettingsError> {
        let mut guard = self
            .contents
            .write()
            .map_err(|_| SettingsError::LockPoisoned)?;
        guard.model = model;
        self.persist(&guard)
    }

    fn persist(&self, contents: &SettingsFile) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(contents).map_err(|source| {
            SettingsError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile, SettingsError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SettingsFile::default());
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(SettingsFile::default());
    }
    serde_json::from_str(&raw).map_err(|source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

impl SettingsSource for JsonSettingsStore {
    fn credential(&self) -> Option<String> {
        let guard = self.contents.read().ok()?;
        guard.api_key.clone().filter(|k| !k.trim().is_empty())
    }

    fn model_config(&self) -> ModelSettings {
        self.contents
            .read()
            .map(|guard| guard.model.clone())
            .unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════
// MemorySettings
// ═══════════════════════════════════════════════════════════

/// Fixed in-memory settings.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    pub credential: Option<String>,
    pub model: ModelSettings,
}

impl MemorySettings {
    pub fn with_credential(credential: &str) -> Self {
        Self {
            credential: Some(credential.to_string()),
            model: ModelSettings::default(),
        }
    }
}

impl SettingsSource for MemorySettings {
    fn credential(&self) -> Option<String> {
        self.credential.clone()
    }

    fn model_config(&self) -> ModelSettings {
        self.model.clone()
    }
}
