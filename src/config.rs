use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_BODY_LIMIT: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backend {
    Memory,
    Sqlite,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "sqlite" => Ok(Backend::Sqlite),
            _ => Err("expected 'memory' or 'sqlite'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err("expected 'text' or 'json'".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub db_path: PathBuf,
    pub store_name: String,
    pub body_limit: u64,
    /// Extra mount point for the routes, e.g. `api` or `.netlify/functions/api`.
    /// Empty means the routes are only served at the bare path.
    pub route_prefix: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            backend: Backend::Memory,
            db_path: PathBuf::from("/data/vehicle_data.db"),
            store_name: "vehicle_data_store".to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
            route_prefix: "api".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let store_name = lookup("VEHICLE_DATA_STORE_NAME").unwrap_or(defaults.store_name);
        if store_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "VEHICLE_DATA_STORE_NAME",
                value: store_name,
                reason: "must not be empty".to_string(),
            });
        }
        Ok(Config {
            port: parse(&lookup, "VEHICLE_DATA_PORT", defaults.port)?,
            backend: parse(&lookup, "VEHICLE_DATA_BACKEND", defaults.backend)?,
            db_path: lookup("VEHICLE_DATA_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            store_name,
            body_limit: parse(&lookup, "VEHICLE_DATA_BODY_LIMIT", defaults.body_limit)?,
            route_prefix: lookup("VEHICLE_DATA_ROUTE_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.route_prefix),
            log_format: parse(&lookup, "VEHICLE_DATA_LOG_FORMAT", defaults.log_format)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }
}

fn parse<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        }
    }
}
