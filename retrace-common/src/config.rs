// Centralized configuration for Retrace

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A snapper-style configuration: one subvolume and where its snapshots live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapperConfig {
    /// Mount point of the subvolume being snapshotted (e.g. "/", "/home")
    pub subvolume: PathBuf,
    /// Directory holding `<number>/snapshot` and `<number>/info.json`
    pub snapshot_dir: PathBuf,
}

impl SnapperConfig {
    /// Directory of one snapshot's metadata
    pub fn snapshot_base(&self, number: u32) -> PathBuf {
        self.snapshot_dir.join(number.to_string())
    }

    /// Root of the snapshotted filesystem tree for `number`
    pub fn snapshot_root(&self, number: u32) -> PathBuf {
        self.snapshot_base(number).join("snapshot")
    }
}

/// On-disk layout of `/etc/retrace/retrace.toml`
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    configs: BTreeMap<String, SnapperConfig>,
    polkit_timeout_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    default_config: Option<String>,
}

/// Retrace configuration with support for file and environment variable overrides
#[derive(Debug, Clone)]
pub struct RetraceConfig {
    /// Path of the TOML file that was (or would be) loaded
    pub config_file: PathBuf,

    /// Known configurations by name; "root" always exists
    pub configs: BTreeMap<String, SnapperConfig>,

    /// Upper bound on a single polkit authorization round-trip
    pub polkit_timeout: Duration,

    /// Helper exits after this long without an incoming call
    pub idle_timeout: Duration,

    /// Configuration used by the command-line client when none is given
    pub default_config_name: String,
}

impl Default for RetraceConfig {
    fn default() -> Self {
        let mut configs = BTreeMap::new();
        configs.insert(
            "root".to_string(),
            SnapperConfig {
                subvolume: PathBuf::from("/"),
                snapshot_dir: PathBuf::from("/.snapshots"),
            },
        );

        Self {
            config_file: PathBuf::from("/etc/retrace/retrace.toml"),
            configs,
            polkit_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(5 * 60),
            default_config_name: "root".to_string(),
        }
    }
}

impl RetraceConfig {
    /// Create a new configuration with file and environment variable overrides
    ///
    /// Supported environment variables:
    /// - RETRACE_CONFIG_FILE: Override the TOML configuration path
    /// - RETRACE_SNAPSHOT_DIR: Override the snapshot directory of the "root" config
    /// - RETRACE_POLKIT_TIMEOUT: Override the polkit timeout (seconds)
    /// - RETRACE_IDLE_TIMEOUT_SECS: Override the helper idle timeout (seconds)
    ///
    /// A missing or unreadable file is logged and ignored; the defaults stay in effect.
    pub fn new() -> Self {
        let mut config = Self::default();

        if let Ok(file) = std::env::var("RETRACE_CONFIG_FILE") {
            config.config_file = PathBuf::from(file);
        }

        if config.config_file.exists() {
            let path = config.config_file.clone();
            if let Err(e) = config.merge_file(&path) {
                log::warn!("Ignoring configuration file {}: {:#}", path.display(), e);
            }
        }

        if let Ok(dir) = std::env::var("RETRACE_SNAPSHOT_DIR") {
            if let Some(root) = config.configs.get_mut("root") {
                root.snapshot_dir = PathBuf::from(dir);
            }
        }

        if let Some(secs) = env_secs("RETRACE_POLKIT_TIMEOUT") {
            config.polkit_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_secs("RETRACE_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Merge settings from a TOML file on top of the current values
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.merge_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Merge settings from TOML text on top of the current values
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(content)?;

        for (name, entry) in &file.configs {
            crate::validate_config_name(name).map_err(|e| anyhow::anyhow!(e))?;
            if !entry.subvolume.is_absolute() || !entry.snapshot_dir.is_absolute() {
                anyhow::bail!("Configuration '{}' must use absolute paths", name);
            }
        }
        self.configs.extend(file.configs);

        if let Some(secs) = file.polkit_timeout_secs {
            self.polkit_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.idle_timeout_secs {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(name) = file.default_config {
            self.default_config_name = name;
        }

        Ok(())
    }

    /// Look up a configuration by name
    pub fn snapper_config(&self, name: &str) -> Option<&SnapperConfig> {
        self.configs.get(name)
    }

    /// Per-user client settings file (`~/.config/retrace/client.toml`)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("retrace").join("client.toml"))
    }
}

fn env_secs(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok())
}
