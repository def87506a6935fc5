use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Cache backend selection (§6 `CACHE_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

/// Process configuration, loaded once at startup from the environment (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub redis_port: u16,
    pub cache_backend: CacheBackend,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            listen_port: parse_env("LISTEN_PORT", 8080)?,
            redis_port: parse_env("REDIS_PORT", 6439)?,
            cache_backend: parse_cache_backend()?,
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 55)?),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {key}")),
    }
}

fn parse_cache_backend() -> Result<CacheBackend> {
    match std::env::var("CACHE_BACKEND") {
        Ok(raw) => match raw.as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(anyhow!(
                "invalid CACHE_BACKEND={other:?}, expected \"memory\" or \"redis\""
            )),
        },
        Err(std::env::VarError::NotPresent) => Ok(CacheBackend::Memory),
        Err(err) => Err(err).context("reading CACHE_BACKEND"),
    }
}
