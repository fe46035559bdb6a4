use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORAGE_BUCKET: &str = "documents";
const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
const DEV_DEFAULT_JWT_SECRET: &str =
    "development-only-auth-provider-secret-x9Qm2Lp7Vt4Rk8Wz3Ny6Bh1Jc5Fd0Gs";

/// Lead-source polling configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LeadSyncConfig {
    /// Run the background scheduler
    #[serde(default = "default_true_bool")]
    pub enabled: bool,

    /// Seconds between scheduler ticks
    #[serde(default = "default_sync_tick_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub tick_secs: u64,

    /// Minimum spacing between IndiaMART calls
    #[serde(default = "default_indiamart_cooldown_secs")]
    pub indiamart_cooldown_secs: u64,

    /// Minimum spacing between TradeIndia calls
    #[serde(default = "default_tradeindia_cooldown_secs")]
    pub tradeindia_cooldown_secs: u64,

    /// Offset applied to the second source so the two never fire together
    #[serde(default = "default_stagger_secs")]
    pub stagger_secs: u64,

    /// Upper bound on the failure backoff delay
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Random jitter as a fraction of the backoff delay
    #[serde(default = "default_jitter_ratio")]
    #[validate(custom = "validate_ratio")]
    pub jitter_ratio: f64,

    /// Timeout for a single serverless function call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LeadSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_sync_tick_secs(),
            indiamart_cooldown_secs: default_indiamart_cooldown_secs(),
            tradeindia_cooldown_secs: default_tradeindia_cooldown_secs(),
            stagger_secs: default_stagger_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            jitter_ratio: default_jitter_ratio(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Statutory payroll parameters
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PayrollConfig {
    /// Provident fund contribution in percent of earned basic
    #[serde(default = "default_pf_rate")]
    #[validate(custom = "validate_percent")]
    pub pf_rate: f64,

    /// Basic salary ceiling the PF percentage applies to
    #[serde(default = "default_pf_wage_ceiling")]
    pub pf_wage_ceiling: f64,

    /// Flat monthly professional tax
    #[serde(default = "default_professional_tax")]
    pub professional_tax: f64,

    /// Gross pay at or above which professional tax applies
    #[serde(default = "default_pt_threshold")]
    pub pt_threshold: f64,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            pf_rate: default_pf_rate(),
            pf_wage_ceiling: default_pf_wage_ceiling(),
            professional_tax: default_professional_tax(),
            pt_threshold: default_pt_threshold(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Request timeout applied by the HTTP stack (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// HS256 secret shared with the auth provider
    #[validate(custom = "validate_jwt_secret")]
    pub auth_jwt_secret: String,

    /// Expected `aud` claim of provider tokens
    #[serde(default = "default_auth_audience")]
    pub auth_jwt_audience: String,

    /// Lifetime of a server-side session
    #[serde(default = "default_session_ttl_secs")]
    #[validate(range(min = 60, max = 604800))]
    pub session_ttl_secs: u64,

    /// Base URL of the serverless functions endpoint
    #[serde(default = "default_functions_base_url")]
    pub functions_base_url: String,

    /// Service key sent as bearer token to serverless functions
    #[serde(default)]
    pub functions_service_key: String,

    /// Object storage bucket for documents and receipts
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u32,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u32,

    /// Background lead sync
    #[serde(default)]
    #[validate]
    pub lead_sync: LeadSyncConfig,

    /// Payroll statutory parameters
    #[serde(default)]
    #[validate]
    pub payroll: PayrollConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything except the essentials
    pub fn new(
        database_url: String,
        auth_jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            auth_jwt_secret,
            auth_jwt_audience: default_auth_audience(),
            session_ttl_secs: default_session_ttl_secs(),
            functions_base_url: default_functions_base_url(),
            functions_service_key: String::new(),
            storage_bucket: default_storage_bucket(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            lead_sync: LeadSyncConfig::default(),
            payroll: PayrollConfig::default(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.auth_jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("auth_jwt_secret_default_dev");
            err.message = Some(
                "The bundled development secret must not be used outside development. Set APP__AUTH_JWT_SECRET."
                    .into(),
            );
            errors.add("auth_jwt_secret", err);
        }

        if self.api_default_page_size == 0 || self.api_default_page_size > self.api_max_page_size
        {
            let mut err = ValidationError::new("api_default_page_size");
            err.message = Some("api_default_page_size must be between 1 and api_max_page_size".into());
            errors.add("api_default_page_size", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_true_bool() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_auth_audience() -> String {
    "authenticated".to_string()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_functions_base_url() -> String {
    "http://localhost:54321/functions/v1".to_string()
}

fn default_storage_bucket() -> String {
    DEFAULT_STORAGE_BUCKET.to_string()
}

fn default_api_page_size() -> u32 {
    20
}

fn default_api_max_page_size() -> u32 {
    100
}

fn default_sync_tick_secs() -> u64 {
    30
}
fn default_indiamart_cooldown_secs() -> u64 {
    300
}
fn default_tradeindia_cooldown_secs() -> u64 {
    600
}
fn default_stagger_secs() -> u64 {
    20
}
fn default_max_backoff_secs() -> u64 {
    3600
}
fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_pf_rate() -> f64 {
    12.0
}
fn default_pf_wage_ceiling() -> f64 {
    15000.0
}
fn default_professional_tax() -> f64 {
    200.0
}
fn default_pt_threshold() -> f64 {
    15000.0
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("auth_jwt_secret");
        err.message = Some("auth_jwt_secret must be at least 32 characters".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("auth_jwt_secret");
            err.message = Some("auth_jwt_secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "password", "your-secret"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("auth_jwt_secret");
        err.message = Some("auth_jwt_secret appears to be a placeholder".into());
        return Err(err);
    }

    Ok(())
}

fn validate_ratio(ratio: f64) -> Result<(), ValidationError> {
    if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
        let mut err = ValidationError::new("jitter_ratio");
        err.message = Some("jitter_ratio must be between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_percent(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        let mut err = ValidationError::new("percent");
        err.message = Some("value must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("branch_erp={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://branch_erp.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("auth_jwt_secret").is_err() {
        error!("Auth secret is not configured. Set APP__AUTH_JWT_SECRET to the provider's JWT secret.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "auth_jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
