//! Server configuration.
//!
//! Values are resolved in layers: built-in defaults, then an optional TOML
//! file (`--config` or `FOURLINE_CONFIG`), then `FOURLINE_*` environment
//! variables, then command-line overrides. The merged result is validated
//! once at the end.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE: &str = "fourline.db";
pub const DEFAULT_MATCHMAKING_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BOT_DELAY: Duration = Duration::from_millis(350);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SINK_CAPACITY: usize = 4096;
pub const DEFAULT_OPPONENT: &str = "heuristic";

/// Upper bound on the pause before a bot move; longer delays make bot games
/// feel stalled.
const MAX_BOT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Timing and sizing knobs of the hub, split out of [`ServerConfig`] so the
/// hub can be built without any networking settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    pub matchmaking_timeout: Duration,
    pub bot_delay: Duration,
    pub outbound_capacity: usize,
    /// How long a fresh socket may stay silent before its `join` frame.
    pub join_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            matchmaking_timeout: DEFAULT_MATCHMAKING_TIMEOUT,
            bot_delay: DEFAULT_BOT_DELAY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub hub: HubSettings,
    pub opponent: String,
    /// Records the sink worker may hold before new ones are dropped.
    pub sink_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            database: PathBuf::from(DEFAULT_DATABASE),
            hub: HubSettings::default(),
            opponent: DEFAULT_OPPONENT.into(),
            sink_capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Ephemeral port and short timers for in-process tests.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            hub: HubSettings {
                matchmaking_timeout: Duration::from_millis(200),
                bot_delay: Duration::from_millis(10),
                outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
                join_timeout: Duration::from_secs(2),
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.matchmaking_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "matchmaking_timeout_ms must be >0".into(),
            ));
        }
        if self.hub.bot_delay >= MAX_BOT_DELAY {
            return Err(ConfigError::Invalid("bot_delay_ms must be <1000".into()));
        }
        if self.hub.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("outbound_capacity must be >0".into()));
        }
        if self.hub.join_timeout.is_zero() {
            return Err(ConfigError::Invalid("join_timeout_ms must be >0".into()));
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::Invalid("sink_capacity must be >0".into()));
        }
        if fourline_ai::create_opponent(&self.opponent).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown opponent `{}`",
                self.opponent
            )));
        }
        Ok(())
    }
}

/// Values supplied on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    database: Option<PathBuf>,
    #[serde(default)]
    matchmaking_timeout_ms: Option<u64>,
    #[serde(default)]
    bot_delay_ms: Option<u64>,
    #[serde(default)]
    outbound_capacity: Option<usize>,
    #[serde(default)]
    opponent: Option<String>,
    #[serde(default)]
    join_timeout_ms: Option<u64>,
    #[serde(default)]
    sink_capacity: Option<usize>,
}

pub fn load(overrides: &ConfigOverrides) -> Result<ServerConfig, ConfigError> {
    let mut cfg = ServerConfig::default();

    let file = overrides
        .config_file
        .clone()
        .or_else(|| env_value("FOURLINE_CONFIG").map(PathBuf::from));
    if let Some(path) = file {
        apply_file(&mut cfg, read_file(&path)?);
    }

    apply_env(&mut cfg)?;

    if let Some(host) = &overrides.host {
        cfg.host = host.clone();
    }
    if let Some(port) = overrides.port {
        cfg.port = port;
    }
    if let Some(database) = &overrides.database {
        cfg.database = database.clone();
    }

    cfg.validate()?;
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn apply_file(cfg: &mut ServerConfig, file: FileConfig) {
    if let Some(v) = file.host {
        cfg.host = v;
    }
    if let Some(v) = file.port {
        cfg.port = v;
    }
    if let Some(v) = file.database {
        cfg.database = v;
    }
    if let Some(ms) = file.matchmaking_timeout_ms {
        cfg.hub.matchmaking_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = file.bot_delay_ms {
        cfg.hub.bot_delay = Duration::from_millis(ms);
    }
    if let Some(v) = file.outbound_capacity {
        cfg.hub.outbound_capacity = v;
    }
    if let Some(v) = file.opponent {
        cfg.opponent = v;
    }
    if let Some(ms) = file.join_timeout_ms {
        cfg.hub.join_timeout = Duration::from_millis(ms);
    }
    if let Some(v) = file.sink_capacity {
        cfg.sink_capacity = v;
    }
}

fn apply_env(cfg: &mut ServerConfig) -> Result<(), ConfigError> {
    if let Some(host) = env_value("FOURLINE_HOST") {
        cfg.host = host;
    }
    if let Some(port) = env_value("FOURLINE_PORT") {
        cfg.port = parse_env("FOURLINE_PORT", &port)?;
    }
    if let Some(database) = env_value("FOURLINE_DATABASE") {
        cfg.database = PathBuf::from(database);
    }
    if let Some(ms) = env_value("FOURLINE_MATCHMAKING_TIMEOUT_MS") {
        cfg.hub.matchmaking_timeout =
            Duration::from_millis(parse_env("FOURLINE_MATCHMAKING_TIMEOUT_MS", &ms)?);
    }
    if let Some(ms) = env_value("FOURLINE_BOT_DELAY_MS") {
        cfg.hub.bot_delay = Duration::from_millis(parse_env("FOURLINE_BOT_DELAY_MS", &ms)?);
    }
    if let Some(capacity) = env_value("FOURLINE_OUTBOUND_CAPACITY") {
        cfg.hub.outbound_capacity = parse_env("FOURLINE_OUTBOUND_CAPACITY", &capacity)?;
    }
    if let Some(opponent) = env_value("FOURLINE_OPPONENT") {
        cfg.opponent = opponent;
    }
    if let Some(ms) = env_value("FOURLINE_JOIN_TIMEOUT_MS") {
        cfg.hub.join_timeout =
            Duration::from_millis(parse_env("FOURLINE_JOIN_TIMEOUT_MS", &ms)?);
    }
    if let Some(capacity) = env_value("FOURLINE_SINK_CAPACITY") {
        cfg.sink_capacity = parse_env("FOURLINE_SINK_CAPACITY", &capacity)?;
    }
    Ok(())
}

/// Unset and empty variables are treated the same.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name}: cannot parse `{raw}`")))
}
