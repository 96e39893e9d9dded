use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_relaunch_backoff_secs")]
    pub relaunch_backoff_secs: u64,
    /// Connections that have not finished the websocket upgrade by then are dropped
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Sampler executable; defaults to `lobby-sampler` next to the running binary
    #[serde(default)]
    pub sampler_bin: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    38560
}

fn default_heartbeat_secs() -> u64 {
    1
}

fn default_relaunch_backoff_secs() -> u64 {
    5
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            relaunch_backoff_secs: default_relaunch_backoff_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            sampler_bin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,
    /// Run a presence sweep every N samples
    #[serde(default = "default_presence_every")]
    pub presence_every: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_concurrent_joins")]
    pub max_concurrent_joins: usize,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

fn default_sample_interval() -> u64 {
    30
}

fn default_presence_every() -> u32 {
    10
}

fn default_max_results() -> usize {
    100
}

fn default_max_concurrent_joins() -> usize {
    8
}

fn default_connect_retries() -> u32 {
    10
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sample_interval(),
            presence_every: default_presence_every(),
            max_results: default_max_results(),
            max_concurrent_joins: default_max_concurrent_joins(),
            connect_retries: default_connect_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the matchmaking directory gateway
    #[serde(default = "default_directory_url")]
    pub url: String,
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

fn default_directory_url() -> String {
    "http://127.0.0.1:38561".to_string()
}

fn default_app_id() -> u32 {
    667970
}

fn default_directory_timeout() -> u64 {
    15
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            app_id: default_app_id(),
            timeout_secs: default_directory_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_surface_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub bot_token: String,
}

fn default_surface_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            api_url: default_surface_api_url(),
            bot_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "lobby-relay")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Directory holding the persisted collections
pub fn data_dir(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.store.data_dir {
        return Ok(dir.clone());
    }
    let dir = directories::ProjectDirs::from("", "", "lobby-relay")
        .context("Could not determine data directory")?
        .data_dir()
        .to_path_buf();
    Ok(dir)
}

/// Load configuration from `path` (or the default location), then apply
/// environment overrides. A missing file yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Config::default()
    };

    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Environment variable carrying the listening port to the sampler subprocess
pub const PORT_ENV: &str = "LOBBY_RELAY_PORT";

/// Apply `LOBBY_RELAY_*` overrides using `lookup` to read variables.
///
/// Unparsable values are ignored with a warning.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parsed(&lookup, PORT_ENV) {
        config.transport.port = port;
    }
    if let Some(secs) = parsed(&lookup, "LOBBY_RELAY_SAMPLE_INTERVAL_SECS") {
        config.sampler.interval_secs = secs;
    }
    if let Some(every) = parsed(&lookup, "LOBBY_RELAY_PRESENCE_EVERY") {
        config.sampler.presence_every = every;
    }
    if let Some(url) = lookup("LOBBY_RELAY_DIRECTORY_URL") {
        config.directory.url = url;
    }
    if let Some(token) = lookup("LOBBY_RELAY_BOT_TOKEN") {
        config.surface.bot_token = token;
    }
    if let Some(dir) = lookup("LOBBY_RELAY_DATA_DIR") {
        config.store.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(bin) = lookup("LOBBY_RELAY_SAMPLER_BIN") {
        config.transport.sampler_bin = Some(PathBuf::from(bin));
    }
}

fn parsed<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}
