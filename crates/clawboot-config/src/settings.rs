//! Bootstrap settings for clawboot
//!
//! Located at `~/.config/clawboot/config.toml`. Every field has a default
//! matching the stock container layout, so the file is optional.

use crate::{ConfigError, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Home directory used when neither the settings nor the OS provide one
const FALLBACK_HOME: &str = "/root";

/// Bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// File mode creation mask applied before any stage runs
    pub umask: u32,
    pub paths: PathsConfig,
    pub ssh: SshConfig,
    pub github: GitHubConfig,
    pub notion: NotionConfig,
    pub mail: MailConfig,
    pub gateway: GatewayConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            umask: 0o022,
            paths: PathsConfig::default(),
            ssh: SshConfig::default(),
            github: GitHubConfig::default(),
            notion: NotionConfig::default(),
            mail: MailConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Filesystem roots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Mounted configuration directory holding descriptors and key material
    pub config_dir: String,
    /// Home directory override (defaults to the invoking user's home)
    pub home: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: "/openclaw/data/config".to_string(),
            home: None,
        }
    }
}

/// SSH agent, key enrollment and host trust
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Start an ssh-agent and export its environment
    pub agent: bool,
    /// Private key to enroll, relative to the config directory
    pub key: String,
    /// Remote host for the known_hosts scan and the probe
    pub host: String,
    /// Remote user for the probe
    pub user: String,
    /// known_hosts file, relative to the home directory
    pub known_hosts: String,
    /// Run the trust-on-first-use host key scan
    pub scan: bool,
    /// Run the one-shot connectivity probe
    pub probe: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            agent: true,
            key: ".ssh/github".to_string(),
            host: "github.com".to_string(),
            user: "git".to_string(),
            known_hosts: ".ssh/known_hosts".to_string(),
            scan: true,
            probe: true,
        }
    }
}

/// Git identity and GitHub token integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Identity descriptor, relative to the config directory
    pub descriptor: String,
    /// Host the credential-store line is written for
    pub host: String,
    /// Username embedded in the credential-store line
    pub credential_user: String,
    /// Environment variable the token is exported as
    pub token_env: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            descriptor: ".github/config.json".to_string(),
            host: "github.com".to_string(),
            credential_user: "x-access-token".to_string(),
            token_env: "GH_TOKEN".to_string(),
        }
    }
}

/// Notes service API key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    pub descriptor: String,
    pub env_var: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            descriptor: ".notion/config.json".to_string(),
            env_var: "NOTION_API_KEY".to_string(),
        }
    }
}

/// Mail client config install
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Source file, relative to the config directory
    pub source: String,
    /// Destination file, relative to the home directory
    pub destination: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            source: ".himalaya/config.toml".to_string(),
            destination: ".config/himalaya/config.toml".to_string(),
        }
    }
}

/// The long-running service launched at the end of the bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway command line, split with shell word rules
    pub command: String,
    /// Listening port passed as `--port`
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: "openclaw gateway".to_string(),
            port: 18789,
        }
    }
}

impl GatewayConfig {
    /// Full argument vector for the gateway, ending with `--port <port>`
    pub fn argv(&self) -> Result<Vec<String>> {
        let mut argv = shell_words::split(&self.command).map_err(|e| {
            ConfigError::Invalid(format!("gateway command {:?}: {}", self.command, e))
        })?;
        if argv.is_empty() {
            return Err(ConfigError::Invalid("gateway command is empty".to_string()));
        }
        argv.push("--port".to_string());
        argv.push(self.port.to_string());
        Ok(argv)
    }
}

impl BootstrapConfig {
    /// Load settings from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            "Loaded config from {:?}: config_dir={}",
            path,
            config.paths.config_dir
        );

        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "clawboot").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The mounted configuration directory
    pub fn config_dir(&self) -> PathBuf {
        expand_path(&self.paths.config_dir)
    }

    /// Home directory: configured override, then the OS, then `/root`
    pub fn home_dir(&self) -> PathBuf {
        if let Some(ref home) = self.paths.home {
            return expand_path(home);
        }
        BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
    }

    /// Resolve an entry relative to the configuration directory
    pub fn resolve_in_config_dir(&self, entry: &str) -> PathBuf {
        resolve_against(&self.config_dir(), entry)
    }
}

/// Resolve an entry relative to `home`
pub fn resolve_in_home(home: &Path, entry: &str) -> PathBuf {
    resolve_against(home, entry)
}

fn expand_path(entry: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(entry).as_ref())
}

/// Absolute and `~/` entries are used as given; anything else joins `base`.
fn resolve_against(base: &Path, entry: &str) -> PathBuf {
    let expanded = expand_path(entry);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
