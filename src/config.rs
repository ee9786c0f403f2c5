use std::time::Duration;

use crate::error::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    /// Upper bound for acquiring a connection and for every statement.
    pub store_timeout: Duration,
    pub run_migrations: bool,
}

impl Config {
    /// Reads the process environment, after `.env` has been loaded.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get("DATABASE_URL").ok_or_else(|| Error::Config("DATABASE_URL is not set".into()))?;
        let max_connections = parse(&get, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be positive".into()));
        }
        let timeout_ms = parse(&get, "STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(Error::Config("STORE_TIMEOUT_MS must be positive".into()));
        }
        Ok(Self {
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            max_connections,
            store_timeout: Duration::from_millis(timeout_ms),
            run_migrations: parse(&get, "RUN_MIGRATIONS", true)?,
        })
    }
}

fn parse<F, T>(get: &F, key: &str, default: T) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| Error::Config(format!("invalid value for {}: {:?}", key, raw))),
        None => Ok(default),
    }
}
