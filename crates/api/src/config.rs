use domain::models::{DEFAULT_EXPIRATION_SECS, DEFAULT_SOURCE_PDF_URL};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Externally reachable base URL, used to build download links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local store; records are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Lifetime of a completed export's download link.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: i64,

    /// Artifact that completed exports resolve to.
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            expiration_secs: default_expiration_secs(),
            source_url: default_source_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherMode {
    /// Run jobs in-process on a spawned task.
    #[default]
    Local,
    /// POST jobs to `callback_url`.
    Webhook,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub mode: DispatcherMode,

    /// Job endpoint for webhook mode.
    #[serde(default)]
    pub callback_url: String,

    /// HMAC key for `X-Webhook-Signature`. Empty disables signing and checks.
    #[serde(default)]
    pub webhook_secret: String,

    /// Time the job processor spends "generating" a PDF.
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

impl DispatcherConfig {
    pub fn secret(&self) -> Option<&str> {
        Some(self.webhook_secret.as_str()).filter(|s| !s.is_empty())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: DispatcherMode::default(),
            callback_url: String::new(),
            webhook_secret: String::new(),
            simulated_delay_ms: default_simulated_delay_ms(),
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// 307 to the artifact URL.
    #[default]
    Redirect,
    /// Stream the artifact through this service.
    Proxy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub mode: DownloadMode,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_expiration_secs() -> i64 {
    DEFAULT_EXPIRATION_SECS
}
fn default_source_url() -> String {
    DEFAULT_SOURCE_PDF_URL.to_string()
}
fn default_simulated_delay_ms() -> u64 {
    1000
}
fn default_dispatch_timeout() -> u64 {
    10
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with PE__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("PE").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on the working directory.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30
            public_base_url = "http://localhost:8080"

            [database]
            url = ""
            max_connections = 5
            min_connections = 1
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [storage]
            backend = "memory"

            [logging]
            level = "debug"
            format = "pretty"

            [security]
            cors_origins = []

            [export]
            expiration_secs = 120

            [dispatcher]
            mode = "local"
            callback_url = ""
            webhook_secret = ""
            simulated_delay_ms = 1000
            timeout_secs = 10

            [download]
            mode = "redirect"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is skipped so tests can build partial configs.
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PE__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.export.expiration_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "export.expiration_secs must be positive".to_string(),
            ));
        }

        if shared::validation::validate_http_url(&self.export.source_url).is_err() {
            return Err(ConfigValidationError::InvalidValue(
                "export.source_url must be an http(s) URL".to_string(),
            ));
        }

        if shared::validation::validate_http_url(&self.server.public_base_url).is_err() {
            return Err(ConfigValidationError::InvalidValue(
                "server.public_base_url must be an http(s) URL".to_string(),
            ));
        }

        if self.dispatcher.mode == DispatcherMode::Webhook {
            if self.dispatcher.callback_url.is_empty() {
                return Err(ConfigValidationError::MissingRequired(
                    "dispatcher.callback_url is required in webhook mode".to_string(),
                ));
            }
            if shared::validation::validate_http_url(&self.dispatcher.callback_url).is_err() {
                return Err(ConfigValidationError::InvalidValue(
                    "dispatcher.callback_url must be an http(s) URL".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Base URL without trailing slashes.
    pub fn public_base_url(&self) -> &str {
        shared::validation::normalize_base_url(&self.server.public_base_url)
    }
}
