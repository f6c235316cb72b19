//! # rf-config
//!
//! Layered process configuration: built-in defaults, then an optional
//! `rusty-forum.toml`, then `RF__`-prefixed environment variables
//! (e.g. `RF__DATABASE__URL`). A `.env` file is loaded first if present.

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration could not be loaded: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Directory uploads are written to
    pub root: String,
    /// Public prefix the files are served under
    pub url_prefix: String,
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// Token signing key. Never logged.
    pub secret: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub json: bool,
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads `.env`, then the layered sources described above.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(ConfigError::Invalid(format!(".env: {err}")));
            }
        }
        Self::from_builder(
            base()?
                .add_source(File::with_name("rusty-forum").required(false))
                .add_source(Environment::with_prefix("RF").separator("__")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.auth.secret.expose_secret().len() < 16 {
            return Err(ConfigError::Invalid(
                "auth.secret must be at least 16 characters".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

fn base() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "sqlite:rusty_forum.db")?
        .set_default("database.max_connections", 8)?
        .set_default("media.root", "./data/uploads")?
        .set_default("media.url_prefix", "/static/uploads")?
        .set_default("media.max_bytes", 5 * 1024 * 1024)?
        .set_default("log.json", false)?
        .set_default("log.filter", "info")?)
}
