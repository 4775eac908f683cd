use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PASSWORD, GateConfig};
use crate::remote::DEFAULT_MAX_BATCH;
use crate::store::TASKS_COLLECTION;
use crate::sync::SyncOptions;

/// Environment variable that overrides `gate.password`.
pub const PASSWORD_ENV: &str = "TRACKBOARD_GATE_PASSWORD";

/// Project config path relative to the project root.
pub const CONFIG_PATH: &str = ".trackboard/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub gate: GateSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    /// JSON file backing the local store; relative paths resolve against
    /// the project root.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            data_file: None,
            batch_limit: default_batch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            search_debounce_ms: default_search_debounce_ms(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn options(&self) -> SyncOptions {
        SyncOptions {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    #[must_use]
    pub const fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GateSection {
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            password: default_password(),
            max_attempts: default_max_attempts(),
            lockout_secs: default_lockout_secs(),
        }
    }
}

impl std::fmt::Debug for GateSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateSection")
            .field("password", &"<redacted>")
            .field("max_attempts", &self.max_attempts)
            .field("lockout_secs", &self.lockout_secs)
            .finish()
    }
}

impl GateSection {
    #[must_use]
    pub fn to_gate_config(&self) -> GateConfig {
        GateConfig {
            password: self.password.clone(),
            max_attempts: self.max_attempts,
            lockout: Duration::from_secs(self.lockout_secs),
        }
    }
}

impl DashboardConfig {
    /// Replace the gate password when `password` is set and non-empty.
    #[must_use]
    pub fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.gate.password = password;
        }
        self
    }

    /// Apply [`PASSWORD_ENV`] if present.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let password = std::env::var(PASSWORD_ENV).ok();
        self.with_password_override(password)
    }

    /// Resolve `store.data_file` against `project_root`.
    #[must_use]
    pub fn data_file(&self, project_root: &Path) -> Option<PathBuf> {
        self.store.data_file.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                project_root.join(path)
            }
        })
    }
}

fn default_collection() -> String {
    TASKS_COLLECTION.to_string()
}

const fn default_batch_limit() -> usize {
    DEFAULT_MAX_BATCH
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_search_debounce_ms() -> u64 {
    300
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_lockout_secs() -> u64 {
    300
}

/// Load `.trackboard/config.toml` under `project_root`; a missing file
/// yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<DashboardConfig> {
    let path = project_root.join(CONFIG_PATH);
    if !path.exists() {
        return Ok(DashboardConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<DashboardConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
