//! # configs
//!
//! Layered configuration: built-in defaults, then `config/{env}.toml` if it
//! exists, then `PAIRPOINTS__SECTION__KEY` environment variables. A `.env`
//! file is loaded into the process environment first.
//!
//! `PAIRPOINTS_ENV` selects the environment (default `dev`). It doubles as
//! the namespace all documents are stored under.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const ENV_SELECTOR: &str = "PAIRPOINTS_ENV";
const ENV_PREFIX: &str = "PAIRPOINTS";
const DEFAULT_ENV: &str = "dev";

#[derive(Error, Debug)]
pub enum ConfigsError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub blobs: BlobConfig,
    #[serde(default)]
    pub push: PushConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `memory`, or a `sqlite:` URL.
    pub url: String,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(deserialize_with = "secret_string")]
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    pub root: PathBuf,
    pub url_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins if set.
    pub filter: String,
}

fn secret_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

/// Loads `.env`, then builds the configuration for the selected environment
/// from `./config`.
pub fn load() -> Result<AppConfig, ConfigsError> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
    let env = std::env::var(ENV_SELECTOR).unwrap_or_else(|_| DEFAULT_ENV.to_string());
    build(&env, Path::new("config"), None)
}

/// `env_vars` replaces the process environment when given.
pub fn build(
    env: &str,
    config_dir: &Path,
    env_vars: Option<HashMap<String, String>>,
) -> Result<AppConfig, ConfigsError> {
    if env.is_empty() || !env.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ConfigsError::Invalid(format!("{ENV_SELECTOR} must be a plain name, got {env:?}")));
    }

    let settings = Config::builder()
        .set_default("env", env)?
        .set_default("server.bind", "127.0.0.1:8080")?
        .set_default("database.url", "memory")?
        .set_default("auth.token_ttl_secs", 2_592_000i64)?
        .set_default("blobs.root", "./data/blobs")?
        .set_default("blobs.url_prefix", "/static/blobs")?
        .set_default("log.format", "pretty")?
        .set_default("log.filter", "info")?
        .add_source(File::from(config_dir.join(env)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").source(env_vars))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigsError> {
    use secrecy::ExposeSecret;

    if config.auth.jwt_secret.expose_secret().len() < 16 {
        return Err(ConfigsError::Invalid("auth.jwt_secret must be at least 16 bytes".into()));
    }
    if !config.database.is_memory() && !config.database.url.starts_with("sqlite:") {
        return Err(ConfigsError::Invalid(format!(
            "database.url must be \"memory\" or a sqlite: URL, got {:?}",
            config.database.url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn defaults_with_secret_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = build("dev", dir.path(), vars(&[("PAIRPOINTS__AUTH__JWT_SECRET", "0123456789abcdef")])).unwrap();
        assert_eq!(config.env, "dev");
        assert!(config.database.is_memory());
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.auth.jwt_secret.expose_secret(), "0123456789abcdef");
        assert!(config.push.webhook_url.is_none());
    }

    #[test]
    fn file_then_environment_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("prod.toml"),
            "[database]\nurl = \"sqlite:data/pairpoints.db\"\n[log]\nformat = \"json\"\n[auth]\njwt_secret = \"from-file-secret-value\"\n",
        )
        .unwrap();
        let config = build("prod", dir.path(), vars(&[("PAIRPOINTS__SERVER__BIND", "0.0.0.0:9000")])).unwrap();
        assert_eq!(config.database.url, "sqlite:data/pairpoints.db");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn rejects_missing_or_weak_secret_and_bad_env() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build("dev", dir.path(), vars(&[])).is_err());
        let weak = build("dev", dir.path(), vars(&[("PAIRPOINTS__AUTH__JWT_SECRET", "short")]));
        assert!(matches!(weak, Err(ConfigsError::Invalid(_))));
        assert!(matches!(build("../etc", dir.path(), vars(&[])), Err(ConfigsError::Invalid(_))));
    }
}
