use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
/// Secret shipped in local setups; refused everywhere but development
const DEV_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";
/// Variables older deployments used for the Service Layer connection
const LEGACY_SAP_VARS: [(&str, &str); 4] = [
    ("sap.server_url", "SAP_B1_SERVER"),
    ("sap.username", "SAP_B1_USERNAME"),
    ("sap.password", "SAP_B1_PASSWORD"),
    ("sap.company_db", "SAP_B1_COMPANY_DB"),
];

mod defaults {
    pub const PORT: u16 = 8080;
    pub const LOG_LEVEL: &str = "info";

    pub fn port() -> u16 {
        PORT
    }
    pub fn log_level() -> String {
        LOG_LEVEL.into()
    }
    pub fn auth_issuer() -> String {
        "multi-grn-api".into()
    }
    pub fn auth_audience() -> String {
        "multi-grn-auth".into()
    }
    pub fn db_max_connections() -> u32 {
        16
    }
    pub fn db_min_connections() -> u32 {
        2
    }
    pub fn db_connect_timeout_secs() -> u64 {
        30
    }
    pub fn db_idle_timeout_secs() -> u64 {
        600
    }
    pub fn db_acquire_timeout_secs() -> u64 {
        8
    }
    pub fn page_size() -> u32 {
        10
    }
    pub fn max_page_size() -> u32 {
        100
    }
    // posting runs one SAP round trip per linked PO inside a single request
    pub fn request_timeout_secs() -> u64 {
        120
    }
    pub fn breaker_failures() -> u32 {
        5
    }
    pub fn breaker_open_secs() -> u64 {
        60
    }
    pub fn breaker_successes() -> u32 {
        2
    }
    pub fn sap_request_timeout_secs() -> u64 {
        30
    }
    pub fn sap_posting_timeout_secs() -> u64 {
        60
    }
    pub fn warehouse() -> String {
        "7000-FG".into()
    }
    pub fn branch_id() -> i32 {
        5
    }
}

/// SAP Business One Service Layer connection settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SapConfig {
    /// Base URL, without the `/b1s/v1` suffix
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub company_db: String,

    /// Lookups and logins
    #[serde(default = "defaults::sap_request_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// Goods-receipt creation, which SAP can be slow to answer
    #[serde(default = "defaults::sap_posting_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub posting_timeout_secs: u64,

    /// Used for lines without a warehouse
    #[serde(default = "defaults::warehouse")]
    #[validate(length(min = 1))]
    pub default_warehouse: String,

    /// Written to `BPL_IDAssignedToInvoice`
    #[serde(default = "defaults::branch_id")]
    pub branch_id: i32,

    /// Service Layer installs often run on self-signed certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for SapConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: String::new(),
            company_db: String::new(),
            request_timeout_secs: defaults::sap_request_timeout_secs(),
            posting_timeout_secs: defaults::sap_posting_timeout_secs(),
            default_warehouse: defaults::warehouse(),
            branch_id: defaults::branch_id(),
            accept_invalid_certs: false,
        }
    }
}

impl SapConfig {
    pub fn is_configured(&self) -> bool {
        [&self.server_url, &self.username, &self.company_db]
            .iter()
            .all(|value| !value.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn posting_timeout(&self) -> Duration {
        Duration::from_secs(self.posting_timeout_secs)
    }
}

/// Service settings. Keys map one to one onto `config/*.toml` entries and
/// `APP__*` variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,

    /// HS256 key for incoming bearer tokens
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "defaults::auth_issuer")]
    pub auth_issuer: String,
    #[serde(default = "defaults::auth_audience")]
    pub auth_audience: String,

    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// `development`, `test`, `staging` or `production`
    pub environment: String,

    #[serde(default = "defaults::log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "defaults::db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "defaults::db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "defaults::db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "defaults::db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "defaults::db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Batch listing page size when the client sends none
    #[serde(default = "defaults::page_size")]
    #[validate(range(min = 1, max = 500))]
    pub api_default_page_size: u32,
    #[serde(default = "defaults::max_page_size")]
    #[validate(range(min = 1, max = 500))]
    pub api_max_page_size: u32,

    /// Whole-request timeout
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Consecutive SAP outages before calls are refused locally
    #[serde(default = "defaults::breaker_failures")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "defaults::breaker_open_secs")]
    pub circuit_breaker_timeout_secs: u64,
    #[serde(default = "defaults::breaker_successes")]
    pub circuit_breaker_success_threshold: u32,

    #[serde(default)]
    #[validate]
    pub sap: SapConfig,
}

impl AppConfig {
    /// Settings with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            auth_issuer: defaults::auth_issuer(),
            auth_audience: defaults::auth_audience(),
            host,
            port,
            environment,
            log_level: defaults::log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: defaults::db_max_connections(),
            db_min_connections: defaults::db_min_connections(),
            db_connect_timeout_secs: defaults::db_connect_timeout_secs(),
            db_idle_timeout_secs: defaults::db_idle_timeout_secs(),
            db_acquire_timeout_secs: defaults::db_acquire_timeout_secs(),
            api_default_page_size: defaults::page_size(),
            api_max_page_size: defaults::max_page_size(),
            request_timeout_secs: defaults::request_timeout_secs(),
            circuit_breaker_failure_threshold: defaults::breaker_failures(),
            circuit_breaker_timeout_secs: defaults::breaker_open_secs(),
            circuit_breaker_success_threshold: defaults::breaker_successes(),
            sap: SapConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn cors_origins(&self) -> impl Iterator<Item = &str> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
    }

    /// Permissive CORS is fine locally or when explicitly requested
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks spanning several fields, run after the derived validation.
    fn validate_deployment(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut reject = |field: &'static str, code: &'static str, message: &'static str| {
            let mut err = ValidationError::new(code);
            err.message = Some(message.into());
            errors.add(field, err);
        };

        if !self.should_allow_permissive_cors() && self.cors_origins().next().is_none() {
            reject(
                "cors_allowed_origins",
                "cors_origins_required",
                "Set APP__CORS_ALLOWED_ORIGINS, or APP__CORS_ALLOW_ANY_ORIGIN=true to opt out",
            );
        }
        if !self.is_development() && self.jwt_secret.trim() == DEV_JWT_SECRET {
            reject(
                "jwt_secret",
                "jwt_secret_dev_only",
                "The development JWT secret cannot be used outside development",
            );
        }
        if self.is_production() && !self.sap.is_configured() {
            reject(
                "sap",
                "sap_not_configured",
                "Production needs the Service Layer URL, user and company DB (APP__SAP__* or SAP_B1_*)",
            );
        }
        if self.api_default_page_size > self.api_max_page_size {
            reject(
                "api_default_page_size",
                "page_size_above_max",
                "api_default_page_size cannot exceed api_max_page_size",
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some("Must be one of: trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let secret = secret.trim();
    let placeholder = ["CHANGE_THIS_SECRET_IN_PRODUCTION", "your-secret-key", "secret"]
        .iter()
        .any(|p| secret.eq_ignore_ascii_case(p));
    let distinct = secret.chars().collect::<HashSet<_>>().len();

    let problem = if placeholder {
        Some("JWT secret is a placeholder; set a random value")
    } else if distinct < 10 {
        Some("JWT secret needs at least 10 distinct characters")
    } else {
        None
    };

    match problem {
        None => Ok(()),
        Some(message) => {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some(message.into());
            Err(err)
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("multi_grn_api={level},tower_http=info"));

    let builder = fmt().with_env_filter(EnvFilter::new(filter));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Loads settings from, lowest precedence first: built-in defaults,
/// `config/default.toml`, `config/{RUN_ENV}.toml`, `APP__*` variables and
/// finally the `SAP_B1_*` variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(env = %run_env, "Loading configuration");
    if !Path::new(CONFIG_DIR).is_dir() {
        warn!("No '{CONFIG_DIR}' directory; using defaults and environment only");
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://multi_grn.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", defaults::PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", defaults::LOG_LEVEL)?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));
    for (key, var) in LEGACY_SAP_VARS {
        let value = env::var(var).ok().filter(|v| !v.trim().is_empty());
        builder = builder.set_override_option(key, value)?;
    }
    let config = builder.build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("APP__JWT_SECRET is not set");
        return Err(ConfigError::NotFound("jwt_secret (set APP__JWT_SECRET)".into()).into());
    }

    let app_config: AppConfig = config.try_deserialize()?;
    if let Err(e) = app_config
        .validate()
        .and_then(|_| app_config.validate_deployment())
    {
        error!(errors = %e, "Invalid configuration");
        return Err(e.into());
    }

    if !app_config.sap.is_configured() {
        warn!("SAP Service Layer is not configured; lookups and posting will fail");
    }
    info!(environment = %app_config.environment, "Configuration loaded");
    Ok(app_config)
}
