//! Configuration management for the GraphRAG relay.
//!
//! The relay reads an optional config file at `~/.graphrag-relay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (a local `.env` file is loaded first)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Network
//! - `RELAY_BIND_ADDRESS` → network.bind
//! - `RELAY_PORT` → network.port
//! - `RELAY_PUBLIC_HOST` → network.public_host
//! - `RELAY_ENV` → network.environment
//!
//! ## Observability
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format
//!
//! ## Graph store
//! - `NEO4J_URI` → neo4j.uri
//! - `NEO4J_USERNAME` → neo4j.username
//! - `NEO4J_DATABASE` → neo4j.database
//! - `NEO4J_PASSWORD` → secrets.neo4j_password
//!
//! ## Model endpoint
//! - `AWS_REGION` → bedrock.region
//! - `BEDROCK_MODEL_ID` → bedrock.model_id
//! - `AWS_ACCESS_KEY_ID` → secrets.aws_access_key_id
//! - `AWS_SECRET_ACCESS_KEY` → secrets.aws_secret_access_key
//! - `AWS_SESSION_TOKEN` → secrets.aws_session_token
//! - `AWS_BEARER_TOKEN_BEDROCK` → secrets.bedrock_bearer_token

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".graphrag-relay"),
        |dirs| dirs.home_dir().join(".graphrag-relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener and public addressing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address.
    /// Default: "127.0.0.1" (local only). Set to "0.0.0.0" for remote access.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default 8000)
    #[serde(default)]
    pub port: Option<u16>,

    /// Host advertised to clients by the WebSocket discovery endpoint.
    /// Falls back to `bind` when unset.
    #[serde(default)]
    pub public_host: Option<String>,

    /// Deployment environment. `production` switches advertised URLs to `wss`.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: None,
            public_host: None,
            environment: default_environment(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_environment() -> String {
    "development".into()
}

// ============================================================================
// Graph Store Configuration
// ============================================================================

/// Neo4j connection settings. The password lives in `secrets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Connection URI (`neo4j://`, `neo4j+s://`, `bolt://`, `bolt+s://`, `http://`, `https://`)
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_username")]
    pub username: String,

    #[serde(default = "default_neo4j_database")]
    pub database: String,

    /// Per-query HTTP timeout
    #[serde(default = "default_collaborator_timeout")]
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            username: default_neo4j_username(),
            database: default_neo4j_database(),
            timeout_secs: default_collaborator_timeout(),
        }
    }
}

fn default_neo4j_uri() -> String {
    "neo4j://localhost:7687".into()
}

fn default_neo4j_username() -> String {
    "neo4j".into()
}

fn default_neo4j_database() -> String {
    "neo4j".into()
}

fn default_collaborator_timeout() -> u64 {
    60
}

// ============================================================================
// Model Endpoint Configuration
// ============================================================================

/// Amazon Bedrock runtime settings. Credentials live in `secrets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_aws_region")]
    pub region: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Endpoint override, e.g. a VPC endpoint or a local mock.
    /// Default: `https://bedrock-runtime.<region>.amazonaws.com`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_collaborator_timeout")]
    pub timeout_secs: u64,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
            model_id: default_model_id(),
            endpoint: None,
            timeout_secs: default_collaborator_timeout(),
        }
    }
}

impl BedrockConfig {
    /// Runtime endpoint honoring the override.
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }
}

fn default_aws_region() -> String {
    "us-east-1".into()
}

fn default_model_id() -> String {
    "amazon.nova-lite-v1:0".into()
}

// ============================================================================
// Secrets Configuration
// ============================================================================

/// Credentials for the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    pub neo4j_password: Option<String>,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    /// Bedrock API key; takes precedence over SigV4 credentials when set.
    #[serde(default)]
    pub bedrock_bearer_token: Option<String>,
}

// ============================================================================
// Uploads Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_max_bytes(),
        }
    }
}

fn default_upload_max_bytes() -> usize {
    10 * 1024 * 1024
}

// ============================================================================
// Observability Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub neo4j: Neo4jConfig,

    #[serde(default)]
    pub bedrock: BedrockConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration, then apply `.env` and process environment overrides.
    pub fn load_with_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored so that a blank line in `.env` does not wipe
    /// a configured value.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("RELAY_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = get("RELAY_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = Some(p),
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid RELAY_PORT"),
            }
        }
        if let Some(host) = get("RELAY_PUBLIC_HOST") {
            self.network.public_host = Some(host);
        }
        if let Some(env) = get("RELAY_ENV") {
            self.network.environment = env;
        }

        if let Some(level) = get("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = get("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(uri) = get("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(username) = get("NEO4J_USERNAME") {
            self.neo4j.username = username;
        }
        if let Some(database) = get("NEO4J_DATABASE") {
            self.neo4j.database = database;
        }

        if let Some(region) = get("AWS_REGION") {
            self.bedrock.region = region;
        }
        if let Some(model_id) = get("BEDROCK_MODEL_ID") {
            self.bedrock.model_id = model_id;
        }

        self.apply_secret_overrides(&get);
    }

    fn apply_secret_overrides<F>(&mut self, get: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = get("NEO4J_PASSWORD") {
            self.secrets.neo4j_password = Some(password);
        }
        if let Some(key) = get("AWS_ACCESS_KEY_ID") {
            self.secrets.aws_access_key_id = Some(key);
        }
        if let Some(secret) = get("AWS_SECRET_ACCESS_KEY") {
            self.secrets.aws_secret_access_key = Some(secret);
        }
        if let Some(token) = get("AWS_SESSION_TOKEN") {
            self.secrets.aws_session_token = Some(token);
        }
        if let Some(token) = get("AWS_BEARER_TOKEN_BEDROCK") {
            self.secrets.bedrock_bearer_token = Some(token);
        }
    }

    // =========================================================================
    // Convenience accessors
    // =========================================================================

    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    pub fn port(&self) -> u16 {
        self.network.port.unwrap_or(8000)
    }

    /// Host advertised to WebSocket clients.
    pub fn public_host(&self) -> &str {
        self.network
            .public_host
            .as_deref()
            .unwrap_or(&self.network.bind)
    }

    pub fn is_production(&self) -> bool {
        self.network.environment.eq_ignore_ascii_case("production")
    }

    pub fn neo4j_password(&self) -> Option<&str> {
        self.secrets
            .neo4j_password
            .as_deref()
            .filter(|p| !p.is_empty())
    }
}
