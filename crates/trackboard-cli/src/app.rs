//! Per-invocation wiring: config, store, shared cache and gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use trackboard_core::cache::SyncCache;
use trackboard_core::config::{DashboardConfig, load_config};
use trackboard_core::error::ErrorCode;
use trackboard_core::gate::{AccessGate, FileStorage, GateError, MemoryStorage};
use trackboard_core::remote::memory::MemoryDocumentStore;
use trackboard_core::store::TaskStore;
use trackboard_core::sync::TaskSync;

use crate::output::{CliError, OutputMode, render_error};

/// Store file used when `store.data_file` is not configured.
pub const DEFAULT_DATA_FILE: &str = ".trackboard/store.json";

/// Supplies the login candidate when `--password` is absent.
pub const CANDIDATE_ENV: &str = "TRACKBOARD_PASSWORD";

/// Overrides where durable gate state is kept.
pub const GATE_FILE_ENV: &str = "TRACKBOARD_GATE_FILE";

pub type Gate = AccessGate<MemoryStorage, FileStorage>;

pub struct App {
    pub config: DashboardConfig,
    pub store: TaskStore<MemoryDocumentStore>,
    pub cache: Arc<SyncCache>,
    pub gate: Gate,
}

impl App {
    /// Load config under `project_root` and open the file-backed store.
    /// A config that fails to load is reported as [`ErrorCode::ConfigParseError`].
    pub fn open(project_root: &Path, output: OutputMode) -> anyhow::Result<Self> {
        let config = match load_config(project_root) {
            Ok(config) => config.with_env_overrides(),
            Err(err) => {
                render_error(
                    output,
                    &CliError::coded(format!("{err:#}"), ErrorCode::ConfigParseError),
                )?;
                return Err(err);
            }
        };

        let data_file = config
            .data_file(project_root)
            .unwrap_or_else(|| project_root.join(DEFAULT_DATA_FILE));
        let remote = MemoryDocumentStore::open(&data_file)
            .with_context(|| format!("Failed to open store at {}", data_file.display()))?;
        let store = TaskStore::new(Arc::new(remote))
            .with_collection(config.store.collection.clone())
            .with_batch_limit(config.store.batch_limit);

        let gate = AccessGate::new(
            config.gate.to_gate_config(),
            MemoryStorage::new(),
            FileStorage::new(gate_file(project_root)),
        );
        tracing::debug!(data_file = %data_file.display(), "app opened");

        Ok(Self {
            config,
            store,
            cache: Arc::new(SyncCache::new()),
            gate,
        })
    }

    /// A controller over this app's store and cache. Not yet activated.
    pub fn sync(&self) -> TaskSync<MemoryDocumentStore> {
        TaskSync::new(
            self.store.clone(),
            Arc::clone(&self.cache),
            self.config.sync.options(),
        )
    }

    /// Unlock the gate for a mutating command.
    ///
    /// The candidate comes from `--password`, falling back to
    /// [`CANDIDATE_ENV`].
    pub fn require_tester(&self, password: Option<&str>, output: OutputMode) -> anyhow::Result<()> {
        let env_password = std::env::var(CANDIDATE_ENV).ok();
        let Some(candidate) = password.or(env_password.as_deref()) else {
            render_error(
                output,
                &CliError {
                    message: "this command requires the tester password".to_string(),
                    suggestion: Some("pass --password or set TRACKBOARD_PASSWORD".to_string()),
                    error_code: None,
                },
            )?;
            anyhow::bail!("password required");
        };
        self.login(candidate, output)
    }

    pub fn login(&self, candidate: &str, output: OutputMode) -> anyhow::Result<()> {
        self.gate.login(candidate).or_else(|err: GateError| {
            render_error(output, &CliError::from(&err))?;
            Err(err.into())
        })
    }
}

/// Durable gate state lives in the user data dir, or under the project
/// when there is none. `TRACKBOARD_GATE_FILE` overrides both.
fn gate_file(project_root: &Path) -> PathBuf {
    if let Some(path) = std::env::var_os(GATE_FILE_ENV) {
        return PathBuf::from(path);
    }
    dirs::data_dir().map_or_else(
        || project_root.join(".trackboard/gate.json"),
        |dir| dir.join("trackboard/gate.json"),
    )
}
