//! Orchestrator configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.gameroom/
//!   config.yaml   (optional — mode 0600; defaults apply when absent)
//! ```
//!
//! # API pattern
//!
//! Functions taking a home directory come in two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Port;

pub const CONFIG_FILE: &str = "config.yaml";

/// Inclusive range of ports handed out to rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub base: Port,
    pub max: Port,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            base: 8000,
            max: 9000,
        }
    }
}

impl PortRange {
    pub fn new(base: Port, max: Port) -> Self {
        Self { base, max }
    }

    pub fn contains(&self, port: Port) -> bool {
        (self.base..=self.max).contains(&port)
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        usize::from(self.max - self.base) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.base > self.max
    }
}

/// Everything the daemon needs to provision rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub port_range: PortRange,
    /// Address used for the transient bind check.
    pub bind_host: IpAddr,
    /// Host placed in the `ws://` endpoint handed to clients.
    pub public_host: String,
    /// Container runtime binary.
    pub runtime: String,
    /// Worker image started for each room.
    pub image: String,
    /// Worker names are `<name_prefix><room id>`.
    pub name_prefix: String,
    pub settle_ms: u64,
    pub verify_attempts: u32,
    pub verify_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            bind_host: IpAddr::from([127, 0, 0, 1]),
            public_host: "localhost".to_string(),
            runtime: "docker".to_string(),
            image: "game-websocket-server".to_string(),
            name_prefix: "game-room-".to_string(),
            settle_ms: 2000,
            verify_attempts: 1,
            verify_interval_ms: 500,
        }
    }
}

impl OrchestratorConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_millis(self.verify_interval_ms)
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_range.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "port_range.base ({}) is greater than port_range.max ({})",
                self.port_range.base, self.port_range.max
            )));
        }
        if self.verify_attempts == 0 {
            return Err(ConfigError::Invalid(
                "verify_attempts must be at least 1".to_string(),
            ));
        }
        if self.runtime.trim().is_empty() {
            return Err(ConfigError::Invalid("runtime must not be empty".to_string()));
        }
        if self.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.gameroom/`
pub fn gameroom_root(home: &Path) -> PathBuf {
    home.join(".gameroom")
}

/// `<home>/.gameroom/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    gameroom_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load config from an explicit file. Missing file ⇒ defaults.
pub fn load_from(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    if !path.exists() {
        return Ok(OrchestratorConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: OrchestratorConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.gameroom/config.yaml`, falling back to defaults.
pub fn load_at(home: &Path) -> Result<OrchestratorConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<OrchestratorConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically write the config: `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &OrchestratorConfig) -> Result<PathBuf, ConfigError> {
    config.validate()?;
    let root = gameroom_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
