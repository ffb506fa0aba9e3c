use serde::Deserialize;
use std::env;
use std::str::FromStr;

use strata_common::error::{StrataError, StrataResult};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub shutdown_grace_secs: u64,
    pub run_once: bool,
}

impl AppConfig {
    /// Reads the process settings, after merging a local `.env` when one exists.
    /// `LOG_LEVEL` is consumed by `init_tracing`, not here.
    pub fn from_env() -> StrataResult<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: parse_var_or("PORT", 8080)?,
            shutdown_grace_secs: parse_var_or("SHUTDOWN_GRACE_SECS", 30)?,
            run_once: get_flag("SYNC_RUN_ONCE", false)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub(crate) fn get_var(key: &str) -> StrataResult<String> {
    env::var(key).map_err(|_| StrataError::Config(format!("{key} is required but not set")))
}

pub(crate) fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

pub(crate) fn get_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_var_or<T>(key: &str, default: T) -> StrataResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| StrataError::Config(format!("invalid {key}: {e}"))),
        None => Ok(default),
    }
}

/// Boolean flags accept `true/false`, `1/0` and `yes/no` (case-insensitive).
pub(crate) fn get_flag(key: &str, default: bool) -> StrataResult<bool> {
    match get_optional(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(StrataError::Config(format!(
                "invalid {key}: expected a boolean, got {other:?}"
            ))),
        },
        None => Ok(default),
    }
}
