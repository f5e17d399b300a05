//! Configuration loading, validation, and management for Kokua.
//!
//! Loads configuration from `~/.kokua/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use kokua_core::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kokua/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote model (Vertex AI) configuration
    #[serde(default)]
    pub vertex: VertexConfig,

    /// Generation parameters sent with every model request
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Chat history database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Authentication / token issuance configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("vertex", &self.vertex)
            .field("generation", &self.generation)
            .field("database", &self.database)
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .finish()
    }
}

/// Connection settings for the hosted generative model.
///
/// `project_id` and `location` absent is a valid, expected condition — the
/// service starts in degraded mode instead of refusing to boot.
#[derive(Clone, Serialize, Deserialize)]
pub struct VertexConfig {
    /// Cloud project identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Region identifier
    #[serde(default = "default_location")]
    pub location: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Access token for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Override the endpoint base URL (testing / proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Per-request timeout for remote calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_location() -> String {
    "us-central1".into()
}
fn default_model() -> String {
    "gemini-pro".into()
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl std::fmt::Debug for VertexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexConfig")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("model", &self.model)
            .field("access_token", &redact(&self.access_token))
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_location(),
            model: default_model(),
            access_token: None,
            api_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl VertexConfig {
    /// Whether the required location/project configuration is present.
    pub fn is_configured(&self) -> bool {
        self.project_id.as_deref().is_some_and(|p| !p.is_empty()) && !self.location.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://kokua.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for signing access tokens
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    /// Access token lifetime
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,
}

fn default_secret_key() -> String {
    "development_secret_key".into()
}
fn default_token_ttl_minutes() -> u64 {
    1440 // 24 hours
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"[REDACTED]")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.kokua/config.toml).
    ///
    /// Environment variables override file values:
    /// - `PROJECT_ID`, `LOCATION`, `VERTEX_ACCESS_TOKEN`, `KOKUA_MODEL`
    /// - `DATABASE_URL`
    /// - `SECRET_KEY`
    /// - `CORS_ORIGINS` (comma-separated)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. No env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (highest priority).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(project_id) = std::env::var("PROJECT_ID") {
            self.vertex.project_id = Some(project_id);
        }
        if let Ok(location) = std::env::var("LOCATION") {
            self.vertex.location = location;
        }
        if let Ok(token) = std::env::var("VERTEX_ACCESS_TOKEN") {
            self.vertex.access_token = Some(token);
        }
        if let Ok(model) = std::env::var("KOKUA_MODEL") {
            self.vertex.model = model;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            self.auth.secret_key = secret;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.gateway.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kokua")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.generation.top_p <= 0.0 || self.generation.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.generation.max_output_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_output_tokens must be > 0".into(),
            ));
        }

        if self.auth.token_ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_minutes must be > 0".into(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vertex: VertexConfig::default(),
            generation: GenerationConfig::default(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.vertex.location, "us-central1");
        assert_eq!(config.vertex.model, "gemini-pro");
        assert!(!config.vertex.is_configured());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.database.url, config.database.url);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.generation.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_top_p_rejected() {
        let mut config = AppConfig::default();
        config.generation.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 8000);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[vertex]
project_id = "demo-project"
location = "us-west1"

[gateway]
port = 9000
cors_origins = ["https://chat.example.com"]
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.vertex.project_id.as_deref(), Some("demo-project"));
        assert_eq!(config.vertex.location, "us-west1");
        assert!(config.vertex.is_configured());
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.cors_origins, vec!["https://chat.example.com"]);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.database.url, "sqlite://kokua.db");
    }

    #[test]
    fn empty_project_id_is_not_configured() {
        let mut config = AppConfig::default();
        config.vertex.project_id = Some(String::new());
        assert!(!config.vertex.is_configured());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("us-central1"));
        assert!(toml_str.contains("8000"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.vertex.access_token = Some("ya29.supersecret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("development_secret_key"));
    }
}
