//! Client configuration: TOML file plus `DASH_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Login endpoint. A 401 here is a wrong password, never an expired session.
pub const LOGIN_PATH: &str = "/auth/login";

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Server-side logout notification endpoint.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// "Who am I" endpoint used to rehydrate a stored session.
pub const ME_PATH: &str = "/auth/me";

/// Paths whose 401 responses are returned as-is instead of starting a refresh.
pub const NON_RECOVERABLE_PATHS: &[&str] = &[LOGIN_PATH, REFRESH_PATH, LOGOUT_PATH];

/// Default user agent.
pub const USER_AGENT: &str = concat!("dash-api/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which settings were overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "api.base_url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Storage key; separate profiles keep separate sessions.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// How many times one request may be replayed after a successful refresh.
    #[serde(default = "default_max_auth_replays")]
    pub max_auth_replays: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            storage_backend: StorageBackend::default(),
            storage_dir: default_storage_dir(),
            max_auth_replays: default_max_auth_replays(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_base_url() -> String {
    "http://127.0.0.1:3000/api".to_string()
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_request_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    USER_AGENT.to_string()
}
fn default_profile() -> String {
    "default".to_string()
}
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dash-api")
        .join("sessions")
}
const fn default_max_auth_replays() -> u32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loading, env overrides, and URL resolution
// ---------------------------------------------------------------------------

impl ClientConfig {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config pointing at `base_url` with in-memory session storage.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.into();
        config.session.storage_backend = StorageBackend::Memory;
        config
    }

    /// Save the file-level configuration (without env overrides) as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed base URL. Always ends with `/` so relative joins keep its path.
    pub fn base_url(&self) -> Result<url::Url> {
        let raw = self.api.base_url.trim();
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let url = url::Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", raw, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("Base URL '{}' cannot be a base", raw)));
        }
        Ok(url)
    }

    /// Apply `DASH_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }

        // -- API --
        env_str!("api.base_url", "DASH_API_BASE_URL", self.api.base_url);
        env_parse!(
            "api.connect_timeout_secs",
            "DASH_API_CONNECT_TIMEOUT",
            self.api.connect_timeout_secs
        );
        env_parse!(
            "api.request_timeout_secs",
            "DASH_API_REQUEST_TIMEOUT",
            self.api.request_timeout_secs
        );
        env_str!("api.user_agent", "DASH_API_USER_AGENT", self.api.user_agent);

        // -- Session --
        env_str!("session.profile", "DASH_SESSION_PROFILE", self.session.profile);
        env_parse!(
            "session.storage_backend",
            "DASH_SESSION_STORAGE",
            self.session.storage_backend
        );
        if let Ok(val) = std::env::var("DASH_SESSION_DIR") {
            self.session.storage_dir = PathBuf::from(val);
            ov.record("session.storage_dir", "DASH_SESSION_DIR");
        }
        env_parse!(
            "session.max_auth_replays",
            "DASH_SESSION_MAX_REPLAYS",
            self.session.max_auth_replays
        );

        // -- Logging --
        env_str!("logging.level", "DASH_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "DASH_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// Helper for the default session directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
