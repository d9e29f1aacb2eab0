use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the SQLite database when `database_url` is unset
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Explicit SQLite connection string, e.g. `sqlite:/var/lib/lexiflow/lexiflow.db?mode=rwc`
    #[serde(default)]
    pub database_url: Option<String>,
    /// Root that document `storage_path`s resolve against. Defaults to
    /// `<data_dir>/documents`.
    #[serde(default)]
    pub documents_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_url: None,
            documents_dir: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the session token
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    /// Idle time after which a session expires (seconds)
    #[serde(default = "default_inactivity_window_secs")]
    pub inactivity_window_secs: u64,
    /// Hard lifetime of a session from creation, regardless of activity (seconds)
    #[serde(default = "default_absolute_ttl_secs")]
    pub absolute_ttl_secs: u64,
    /// Lifetime of an email verification code (seconds)
    #[serde(default = "default_verification_code_ttl_secs")]
    pub verification_code_ttl_secs: u64,
    /// Return verification codes in API responses instead of only issuing them.
    /// Stand-in until codes are delivered by email.
    #[serde(default = "default_expose_verification_code")]
    pub expose_verification_code: bool,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: default_session_cookie_name(),
            inactivity_window_secs: default_inactivity_window_secs(),
            absolute_ttl_secs: default_absolute_ttl_secs(),
            verification_code_ttl_secs: default_verification_code_ttl_secs(),
            expose_verification_code: default_expose_verification_code(),
            min_password_length: default_min_password_length(),
        }
    }
}

/// Longest TTL any auth setting may take (ten years)
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl AuthConfig {
    pub fn inactivity_window(&self) -> Duration {
        ttl_duration(self.inactivity_window_secs)
    }

    pub fn absolute_ttl(&self) -> Duration {
        ttl_duration(self.absolute_ttl_secs)
    }

    pub fn verification_code_ttl(&self) -> Duration {
        ttl_duration(self.verification_code_ttl_secs)
    }
}

/// Seconds to a duration, saturating instead of overflowing
fn ttl_duration(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn default_session_cookie_name() -> String {
    "lexiflow_session".to_string()
}

fn default_inactivity_window_secs() -> u64 {
    10 * 60
}

fn default_absolute_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_verification_code_ttl_secs() -> u64 {
    15 * 60
}

fn default_expose_verification_code() -> bool {
    true
}

fn default_min_password_length() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session and verification policies cannot work with
    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;
        if auth.inactivity_window_secs == 0 {
            bail!("auth.inactivity_window_secs must be greater than zero");
        }
        if auth.absolute_ttl_secs < auth.inactivity_window_secs {
            bail!("auth.absolute_ttl_secs must be at least auth.inactivity_window_secs");
        }
        if auth.verification_code_ttl_secs == 0 {
            bail!("auth.verification_code_ttl_secs must be greater than zero");
        }
        for (name, secs) in [
            ("auth.inactivity_window_secs", auth.inactivity_window_secs),
            ("auth.absolute_ttl_secs", auth.absolute_ttl_secs),
            ("auth.verification_code_ttl_secs", auth.verification_code_ttl_secs),
        ] {
            if secs > MAX_TTL_SECS {
                bail!("{} must not exceed {} seconds", name, MAX_TTL_SECS);
            }
        }
        if auth.session_cookie_name.trim().is_empty() {
            bail!("auth.session_cookie_name must not be empty");
        }
        Ok(())
    }

    /// Directory holding downloadable document files
    pub fn documents_dir(&self) -> PathBuf {
        self.server
            .documents_dir
            .clone()
            .unwrap_or_else(|| self.server.data_dir.join("documents"))
    }

    /// Connection string for the SQLite database
    pub fn database_url(&self) -> String {
        match &self.server.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}?mode=rwc",
                self.server.data_dir.join("lexiflow.db").display()
            ),
        }
    }
}
