use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::utils::StringExt;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub warehouse: WarehouseConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub llm: LlmConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

/// Deployment environment. Production tightens CORS and sanitises error
/// detail; development logs human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Fail-closed: empty means no browser origins.
    /// `*` is forbidden in production mode.
    pub allowed_origins: Vec<String>,
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Path to the SQLite warehouse file (required).
    pub db_path: String,
    /// Path to the dataset manifest JSON (required).
    pub manifest_path: String,
    /// Base pool size.
    pub pool_size: u32,
    /// Extra connections allowed beyond the base size.
    pub max_overflow: u32,
    /// Bounded wait for a pool checkout, in seconds.
    pub acquire_timeout_secs: u64,
    /// Per-query execution timeout, in seconds.
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached result sets.
    pub size: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions base URL (required).
    pub api_base: String,
    /// `username:password` credential sent as basic auth (required).
    pub credential: String,
    pub model: String,
    /// Process-wide cap on simultaneous LLM calls.
    pub concurrency_limit: usize,
    pub temperature: f64,
    pub timeout_seconds: u64,
    /// Hard tool-call budget per question.
    pub max_tool_calls: u32,
    pub retry_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Optional alias-table JSON; built-in tables are used when absent.
    pub aliases_path: Option<String>,
    /// Minimum similarity for a fuzzy match to be accepted.
    pub fuzzy_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "carbonatlas")]
#[command(version, about = "CarbonAtlas - grounded CO2 emissions question answering")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Serve the line-delimited JSON-RPC tool server on stdin/stdout
    /// instead of HTTP
    #[arg(long)]
    pub stdio: bool,

    /// Server port (overrides config file and PORT)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Warehouse SQLite file (overrides DB_PATH)
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<String>,

    /// Dataset manifest JSON (overrides MCP_MANIFEST_PATH)
    #[arg(long, value_name = "PATH")]
    pub manifest_path: Option<String>,

    /// Logging level (e.g., "info,carbon_atlas=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file
    /// support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<(Self, CommandLineArgs), anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        let config = Self::load_with_args(&cli_args)?;
        Ok((config, cli_args))
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - DB_PATH, MCP_MANIFEST_PATH (required unless set in the file)
    /// - PORT, ALLOWED_ORIGINS (CSV), ENVIRONMENT (production|development)
    /// - RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW_SECONDS
    /// - DB_POOL_SIZE, DB_POOL_MAX_OVERFLOW
    /// - CACHE_SIZE, CACHE_TTL_SECONDS
    /// - LLM_API_BASE, LLM_CREDENTIAL (username:password), LLM_MODEL,
    ///   LLM_CONCURRENCY_LIMIT
    /// - ENTITY_ALIASES_PATH, LOG_LEVEL, LOG_FILE
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DB_PATH") {
            self.warehouse.db_path = path;
        }
        if let Ok(path) = std::env::var("MCP_MANIFEST_PATH") {
            self.warehouse.manifest_path = path;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .filter_map(|s| s.clean())
                .collect();
        }
        if let Ok(env) = std::env::var("ENVIRONMENT") {
            match env.to_lowercase().as_str() {
                "production" => self.server.environment = Environment::Production,
                "development" => self.server.environment = Environment::Development,
                other => tracing::warn!("Unknown ENVIRONMENT '{}', keeping default", other),
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            && let Ok(v) = v.parse()
        {
            self.rate_limit.max_requests = v;
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_WINDOW_SECONDS")
            && let Ok(v) = v.parse()
        {
            self.rate_limit.window_seconds = v;
        }
        if let Ok(v) = std::env::var("DB_POOL_SIZE")
            && let Ok(v) = v.parse()
        {
            self.warehouse.pool_size = v;
        }
        if let Ok(v) = std::env::var("DB_POOL_MAX_OVERFLOW")
            && let Ok(v) = v.parse()
        {
            self.warehouse.max_overflow = v;
        }
        if let Ok(v) = std::env::var("CACHE_SIZE")
            && let Ok(v) = v.parse()
        {
            self.cache.size = v;
        }
        if let Ok(v) = std::env::var("CACHE_TTL_SECONDS")
            && let Ok(v) = v.parse()
        {
            self.cache.ttl_seconds = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = v;
        }
        if let Ok(v) = std::env::var("LLM_CREDENTIAL") {
            self.llm.credential = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_CONCURRENCY_LIMIT")
            && let Ok(v) = v.parse()
        {
            self.llm.concurrency_limit = v;
        }
        if let Ok(v) = std::env::var("ENTITY_ALIASES_PATH") {
            self.resolver.aliases_path = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("LOG_FILE") {
            self.logging.file = Some(v);
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(path) = &args.db_path {
            self.warehouse.db_path = path.clone();
        }
        if let Some(path) = &args.manifest_path {
            self.warehouse.manifest_path = path.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate configuration. Any failure here is fatal: the process must
    /// not start half-configured.
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.warehouse.db_path.is_empty() {
            anyhow::bail!("DB_PATH is required");
        }
        if self.warehouse.manifest_path.is_empty() {
            anyhow::bail!("MCP_MANIFEST_PATH is required");
        }
        if self.warehouse.pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be > 0");
        }
        if self.server.port == 0 {
            anyhow::bail!("PORT cannot be 0");
        }
        if self.llm.api_base.is_empty() {
            anyhow::bail!("LLM_API_BASE is required");
        }
        if self.llm.credential.is_empty() {
            anyhow::bail!("LLM_CREDENTIAL is required (username:password)");
        }
        if !self.llm.credential.contains(':') {
            anyhow::bail!("LLM_CREDENTIAL must be in username:password form");
        }
        if self.llm.concurrency_limit == 0 {
            anyhow::bail!("LLM_CONCURRENCY_LIMIT must be > 0");
        }
        if self.server.environment.is_production()
            && self.server.allowed_origins.iter().any(|o| o == "*")
        {
            anyhow::bail!("wildcard ALLOWED_ORIGINS is forbidden in production mode");
        }
        if !(0.0..=1.0).contains(&self.resolver.fuzzy_threshold) {
            anyhow::bail!("resolver.fuzzy_threshold must be within [0, 1]");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8010,
            allowed_origins: Vec::new(),
            environment: Environment::Development,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            manifest_path: String::new(),
            pool_size: 10,
            max_overflow: 5,
            acquire_timeout_secs: 5,
            query_timeout_secs: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { size: 1000, ttl_seconds: 300 }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 100, window_seconds: 60 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            credential: String::new(),
            model: "gpt-4o-mini".to_string(),
            concurrency_limit: 10,
            temperature: 0.2,
            timeout_seconds: 120,
            max_tool_calls: 6,
            retry_attempts: 3,
            retry_base_delay_secs: 2,
            retry_max_delay_secs: 10,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { aliases_path: None, fuzzy_threshold: 0.75 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,carbon_atlas=debug".to_string(), file: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid() -> Config {
        let mut c = Config::default();
        c.warehouse.db_path = "/data/warehouse.db".into();
        c.warehouse.manifest_path = "/data/manifest.json".into();
        c.llm.api_base = "http://localhost:4000/v1".into();
        c.llm.credential = "svc:secret".into();
        c
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal_valid().validate().is_ok());
    }

    #[test]
    fn missing_required_fields_fail() {
        let mut c = minimal_valid();
        c.warehouse.db_path.clear();
        assert!(c.validate().is_err());

        let mut c = minimal_valid();
        c.llm.credential = "no-separator".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn wildcard_origin_rejected_in_production() {
        let mut c = minimal_valid();
        c.server.environment = Environment::Production;
        c.server.allowed_origins = vec!["*".into()];
        assert!(c.validate().is_err());

        c.server.environment = Environment::Development;
        assert!(c.validate().is_ok());
    }
}
