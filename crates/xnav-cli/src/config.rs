//! Configuration Vault – reads/writes `~/.xnav/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use xnav_client::ClientConfig;

/// Persisted monitor configuration stored in `~/.xnav/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control-loop period in milliseconds.
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,

    /// Print a status report every this many loop cycles.
    #[serde(default = "default_report_every")]
    pub report_every: u64,

    /// Tags placed in front of the simulated camera.
    #[serde(default = "default_sim_tags")]
    pub sim_tags: Vec<i32>,

    /// Settings handed to the vision client (`[client]` table).
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_loop_period_ms() -> u64 {
    20
}
fn default_report_every() -> u64 {
    50
}
fn default_sim_tags() -> Vec<i32> {
    vec![1, 7]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loop_period_ms: default_loop_period_ms(),
            report_every: default_report_every(),
            sim_tags: default_sim_tags(),
            client: ClientConfig::default(),
        }
    }
}

/// Return the path to `~/.xnav/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".xnav").join("config.toml")
}

/// Load the config from disk with `XNAV_*` overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.client
        .validate()
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `XNAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `XNAV_TABLE` | `client.table_name` |
/// | `XNAV_SERVER` | `client.server_address` |
/// | `XNAV_TEAM` | `client.team_number` |
/// | `XNAV_LOOP_PERIOD_MS` | `loop_period_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("XNAV_TABLE") {
        cfg.client.table_name = v;
    }
    if let Ok(v) = std::env::var("XNAV_SERVER") {
        cfg.client.server_address = Some(v);
    }
    if let Ok(v) = std::env::var("XNAV_TEAM")
        && let Ok(team) = v.trim().parse::<u32>()
    {
        cfg.client.team_number = Some(team);
    }
    if let Ok(v) = std::env::var("XNAV_LOOP_PERIOD_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
        && ms > 0
    {
        cfg.loop_period_ms = ms;
    }
}

/// Save the config to disk, creating `~/.xnav/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
