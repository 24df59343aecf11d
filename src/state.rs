//! Application state and configuration.
//!
//! Wires the document store, ledger, and session manager together behind
//! one struct handed to the CLI commands. Configuration lives at
//! `~/.storekpi/config.json`; a missing file means defaults.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ledger::Ledger;
use crate::session::SessionManager;
use crate::store::{DocumentStore, SqliteStore};
use crate::types::Config;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub ledger: Arc<Ledger>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Open the configured store and build the component graph.
    pub fn init() -> Result<Self, String> {
        let config = match load_config() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e}");
                Config::default()
            }
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self, String> {
        let store: Arc<dyn DocumentStore> = Arc::new(
            SqliteStore::open(&config).map_err(|e| format!("Failed to open store: {e}"))?,
        );
        let ledger = Arc::new(Ledger::new(store.clone(), &config));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            &config,
            session_path()?,
        ));
        Ok(Self {
            config,
            store,
            ledger,
            sessions,
        })
    }
}

/// Get the canonical config file path (`~/.storekpi/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    Ok(state_dir()?.join("config.json"))
}

/// Path of the persisted session file.
pub fn session_path() -> Result<PathBuf, String> {
    Ok(state_dir()?.join("session.json"))
}

/// Get the state directory (`~/.storekpi`), creating it when absent.
pub fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    let state_dir = home.join(".storekpi");

    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).map_err(|e| format!("Failed to create state dir: {e}"))?;
    }

    Ok(state_dir)
}

/// Load configuration from `~/.storekpi/config.json`.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    if !path.exists() {
        return Err(format!("Config file not found at {}", path.display()));
    }

    let content =
        fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))
}

/// Create or update config.json atomically: load (or default), apply the
/// mutator, write back.
pub fn create_or_update_config(mutator: impl FnOnce(&mut Config)) -> Result<Config, String> {
    let mut config = load_config().unwrap_or_default();
    mutator(&mut config);

    let path = config_path()?;
    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {e}"))?;

    Ok(config)
}
