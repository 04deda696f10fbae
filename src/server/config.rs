use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::notifications::senders::telegram::TELEGRAM_API_BASE;

const DEV_JWT_SECRET: &str = "mountwatch-development-secret-change-me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub data_dir: String,
    pub log_dir: String,
    pub jwt_secret: String,
    pub telegram_api_base: String,
    /// Marks the session cookie `Secure`. Enable when served over HTTPS.
    pub secure_cookie: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_addr: Option<String>,
    data_dir: Option<String>,
    log_dir: Option<String>,
    jwt_secret: Option<String>,
    telegram_api_base: Option<String>,
    secure_cookie: Option<bool>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        PartialServerConfig::default().into_config(PartialServerConfig::default())
    }
}

impl PartialServerConfig {
    /// `self` is the environment layer and wins over `file`.
    fn into_config(self, file: PartialServerConfig) -> ServerConfig {
        ServerConfig {
            listen_addr: self
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            data_dir: self.data_dir.or(file.data_dir).unwrap_or_else(default_data_dir),
            log_dir: self.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            jwt_secret: self
                .jwt_secret
                .or(file.jwt_secret)
                .unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            telegram_api_base: self
                .telegram_api_base
                .or(file.telegram_api_base)
                .unwrap_or_else(|| TELEGRAM_API_BASE.to_string()),
            secure_cookie: self.secure_cookie.or(file.secure_cookie).unwrap_or(false),
        }
    }
}

impl ServerConfig {
    /// Loads `.env`, then the optional TOML file, then environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_from(config_path, std::env::vars())
    }

    fn load_from<I>(config_path: Option<&str>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // 1. Load from file (optional)
        let file_config = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables, which override the file
        let env_config: PartialServerConfig = envy::from_iter(env)?;
        Ok(env_config.into_config(file_config))
    }

    /// True when no secret was configured. Logged at startup.
    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }
}
