//! Configuration management for the Transfer Manager
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with TM__ prefix
//! 4. The deployment variables LS_API_TOKEN, LS_DOMAIN_PREFIX and APP_DEBUG

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Lightspeed Retail API configuration
    pub lightspeed: LightspeedConfig,

    /// Sync flag configuration
    pub sync: SyncConfig,

    /// Token and CSRF configuration
    pub security: SecurityConfig,

    /// Audit outbox relay configuration
    pub outbox: OutboxConfig,

    /// Verbose logging
    pub debug: bool,

    /// Attach a `system` snapshot to every error envelope
    pub error_diagnostics: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LightspeedConfig {
    /// Personal access token; an empty token fails every outbound call
    #[serde(default)]
    pub api_token: String,

    /// Store subdomain, as in `{prefix}.retail.lightspeed.app`
    pub domain_prefix: String,

    /// Overrides the API base URL derived from the domain prefix
    #[serde(default)]
    pub base_url: Option<String>,

    /// Total request timeout in seconds
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Retries after a 429 or 5xx response
    pub retries: u32,

    pub user_agent: String,
}

impl LightspeedConfig {
    pub fn api_base(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.retail.lightspeed.app/api/2.0", self.domain_prefix),
        }
    }

    pub fn ui_base(&self) -> String {
        format!("https://{}.retail.lightspeed.app/app/2.0", self.domain_prefix)
    }

    /// Link to a consignment in the retail back office
    pub fn consignment_url(&self, id: &str) -> String {
        format!("{}/consignments/{}", self.ui_base(), id)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// File holding `1` (enabled) or `0` (disabled)
    pub flag_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Secret for validating bearer tokens
    pub jwt_secret: String,

    /// Secret for deriving CSRF tokens
    pub csrf_secret: String,

    /// Honour the `testing` body flag and skip the CSRF check
    pub allow_testing_bypass: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    /// Seconds between relay passes
    pub poll_interval_secs: u64,

    /// Events delivered per pass
    pub batch_size: i64,

    /// Delivery attempts before an event is left for inspection
    pub max_attempts: i32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("TM_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let ls_token = std::env::var("LS_API_TOKEN").ok();
        let ls_prefix = std::env::var("LS_DOMAIN_PREFIX")
            .ok()
            .filter(|p| !p.trim().is_empty());
        let app_debug = std::env::var("APP_DEBUG").ok().map(|v| v == "true");

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("lightspeed.api_token", "")?
            .set_default("lightspeed.domain_prefix", "vapeshed")?
            .set_default("lightspeed.timeout_secs", 30)?
            .set_default("lightspeed.connect_timeout_secs", 10)?
            .set_default("lightspeed.retries", 2)?
            .set_default("lightspeed.user_agent", "CIS-Transfers-Backend/3.0")?
            .set_default("sync.flag_file", ".sync_enabled")?
            .set_default("security.allow_testing_bypass", false)?
            .set_default("outbox.poll_interval_secs", 5)?
            .set_default("outbox.batch_size", 50)?
            .set_default("outbox.max_attempts", 10)?
            .set_default("debug", false)?
            .set_default("error_diagnostics", true)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (TM__ prefix)
            .add_source(
                Environment::with_prefix("TM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            // Deployment variables shared with the rest of the estate
            .set_override_option("lightspeed.api_token", ls_token)?
            .set_override_option("lightspeed.domain_prefix", ls_prefix)?
            .set_override_option("debug", app_debug)?
            .build()?;

        config.try_deserialize()
    }
}
