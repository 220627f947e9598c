use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Periodic checkpointing of the active session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_autosave_enabled")]
    pub enabled: bool,
    /// Milliseconds between autosave ticks (default: 15000)
    #[serde(default = "default_autosave_interval_ms")]
    pub interval_ms: u64,
}

fn default_autosave_enabled() -> bool {
    true
}

fn default_autosave_interval_ms() -> u64 {
    15_000 // 15 seconds
}

impl AutosaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_autosave_enabled(),
            interval_ms: default_autosave_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hours a session stays resumable after its last checkpoint (default: 72)
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: u64,
    /// Owner label attached to new sessions, used to filter session listings
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_session_ttl_hours() -> u64 {
    72 // 3 days
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::try_from(self.ttl_hours).unwrap_or(i64::MAX / 3600))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_session_ttl_hours(),
            owner: None,
        }
    }
}

/// Undo/redo history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Oldest entries are dropped past this size (default: 100)
    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
    /// Record note edits as undoable commands
    #[serde(default)]
    pub track_notes: bool,
    /// Record checkbox toggles as undoable commands
    #[serde(default)]
    pub track_checked: bool,
}

fn default_history_max_entries() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_max_entries(),
            track_notes: false,
            track_checked: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound in milliseconds for a single store call (default: 5000)
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    5_000 // 5 seconds
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Telemetry event delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
    /// Emit every event as a structured log line
    #[serde(default = "default_telemetry_log_events")]
    pub log_events: bool,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_telemetry_log_events() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_events: default_telemetry_log_events(),
            webhooks: Vec::new(),
        }
    }
}

/// One webhook endpoint receiving telemetry events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_webhook_enabled")]
    pub enabled: bool,
    pub url: String,
    /// "bearer" or "basic"; anything else sends no auth header
    #[serde(default)]
    pub auth_type: Option<String>,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Environment variable holding the basic auth password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Event types to forward (e.g. "run.completed"); empty forwards all
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

fn default_webhook_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Base URL unload beacons are posted to. Unset means beacons are
    /// written straight to the local store.
    #[serde(default)]
    pub beacon_base_url: Option<String>,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    7018
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            beacon_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Checkpoint store and logs live here
    pub state: String,
    /// Directory searched for workflow definitions given by id
    #[serde(default = "default_workflows_path")]
    pub workflows: String,
}

fn default_workflows_path() -> String {
    "workflows".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether `serve` logs to a file under the state directory
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".runner/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the runner works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Project config in .runner/
        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/workflow-runner/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("workflow-runner").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with RUNNER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("RUNNER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .runner/config.toml
    pub fn save(&self) -> Result<()> {
        let config_path = Self::project_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create runner config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        absolute(&self.paths.state)
    }

    /// Get absolute path to workflow definitions directory
    pub fn workflows_path(&self) -> PathBuf {
        absolute(&self.paths.workflows)
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

fn absolute(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autosave: AutosaveConfig::default(),
            session: SessionConfig::default(),
            history: HistoryConfig::default(),
            store: StoreConfig::default(),
            telemetry: TelemetryConfig::default(),
            api: ApiConfig::default(),
            paths: PathsConfig {
                state: ".runner".to_string(),
                workflows: default_workflows_path(),
            },
            logging: LoggingConfig::default(),
        }
    }
}
