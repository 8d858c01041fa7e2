use std::env;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidNumber(&'static str, ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    pub db_path: String,
    pub blob_root: String,
    pub download_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("CUBE_PORT")
            .unwrap_or_else(|_| "4520".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidNumber("CUBE_PORT", e))?;

        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let cors_origin =
            env::var("CUBE_CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let db_path = env::var("CUBE_DB_PATH").unwrap_or_else(|_| "data/cube.db".to_string());

        let blob_root = env::var("CUBE_BLOB_ROOT").unwrap_or_else(|_| "data/blobs".to_string());

        let download_ttl_secs = env::var("CUBE_DOWNLOAD_TTL_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidNumber("CUBE_DOWNLOAD_TTL_SECS", e))?;

        Ok(Config {
            port,
            cors_origin,
            db_path,
            blob_root,
            download_ttl_secs,
        })
    }
}
