//! Configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--root`, `--container`, `--timeout-ms`)
//! 2. `--config <file>`
//! 3. `$DATAROOM_CONFIG` environment variable (path to config file)
//! 4. Project-local `.dataroom.toml` in the current working directory
//! 5. Global `~/.config/dataroom/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::view::row::SearchScope;

// ── Section configs ──────────────────────────────────────────────────────────

/// Which container to mirror and how its keys are scoped.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Container (data room) name.
    pub container: Option<String>,
    /// Bucket/identity prefix carried by listing keys.
    pub key_prefix: Option<String>,
}

/// Backend settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory holding one subdirectory per container.
    pub root: Option<String>,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ViewConfig {
    /// Search the whole container (true) or only below the current folder.
    pub search_scope_root: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub remote: RemoteConfig,
    pub view: ViewConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_CONTAINER: &str = "default";
/// Default remote call timeout (30 s).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOG_FILTER: &str = "warn";

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order. `--config` is handled
/// separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("DATAROOM_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".dataroom.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("dataroom").join("config.toml"));
    }

    paths
}

/// Read and parse a TOML config file. Returns `None` if the file doesn't
/// exist or can't be parsed (with a warning).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            // Logging is not up yet while config loads.
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                container: other
                    .general
                    .container
                    .clone()
                    .or(self.general.container),
                key_prefix: other
                    .general
                    .key_prefix
                    .clone()
                    .or(self.general.key_prefix),
            },
            remote: RemoteConfig {
                root: other.remote.root.clone().or(self.remote.root),
                timeout_ms: other.remote.timeout_ms.or(self.remote.timeout_ms),
            },
            view: ViewConfig {
                search_scope_root: other
                    .view
                    .search_scope_root
                    .or(self.view.search_scope_root),
            },
            logging: LoggingConfig {
                filter: other.logging.filter.clone().or(self.logging.filter),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn container(&self) -> &str {
        self.general
            .container
            .as_deref()
            .unwrap_or(DEFAULT_CONTAINER)
    }

    pub fn key_prefix(&self) -> &str {
        self.general.key_prefix.as_deref().unwrap_or("")
    }

    pub fn remote_root(&self) -> PathBuf {
        PathBuf::from(self.remote.root.as_deref().unwrap_or("."))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.remote.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn search_scope(&self) -> SearchScope {
        if self.view.search_scope_root.unwrap_or(true) {
            SearchScope::Root
        } else {
            SearchScope::Current
        }
    }

    pub fn log_filter(&self) -> &str {
        self.logging
            .filter
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
