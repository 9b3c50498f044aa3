use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeConfig {
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub max_upload_bytes: usize,
    pub upload_dir: Option<PathBuf>,
    pub strict_validation: bool,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = non_empty("INTAKE_DATABASE_URL").or_else(|| non_empty("DATABASE_URL"));

        let bind_addr = match non_empty("INTAKE_BIND_ADDR") {
            Some(value) => parse_value("INTAKE_BIND_ADDR", &value)?,
            None => SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
        };

        let max_connections = match non_empty("INTAKE_MAX_CONNECTIONS") {
            Some(value) => parse_value("INTAKE_MAX_CONNECTIONS", &value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let max_upload_bytes = match non_empty("INTAKE_MAX_UPLOAD_BYTES") {
            Some(value) => parse_value("INTAKE_MAX_UPLOAD_BYTES", &value)?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let strict_validation = match non_empty("INTAKE_STRICT_VALIDATION") {
            Some(value) => parse_flag("INTAKE_STRICT_VALIDATION", &value)?,
            None => false,
        };

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            max_upload_bytes,
            upload_dir: non_empty("INTAKE_UPLOAD_DIR").map(PathBuf::from),
            strict_validation,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("INTAKE_DATABASE_URL (or DATABASE_URL)"))
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<IntakeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IntakeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).expect("config");
        assert_eq!(config.database_url, None);
        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.upload_dir, None);
        assert!(!config.strict_validation);
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn intake_database_url_wins_over_fallback() {
        let config = config(&[
            ("DATABASE_URL", "postgres://fallback"),
            ("INTAKE_DATABASE_URL", "postgres://primary"),
        ])
        .expect("config");
        assert_eq!(config.require_database_url().unwrap(), "postgres://primary");
    }

    #[test]
    fn parses_overrides() {
        let config = config(&[
            ("INTAKE_BIND_ADDR", "127.0.0.1:8080"),
            ("INTAKE_MAX_CONNECTIONS", "3"),
            ("INTAKE_UPLOAD_DIR", "uploads"),
            ("INTAKE_STRICT_VALIDATION", "yes"),
        ])
        .expect("config");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.upload_dir, Some(PathBuf::from("uploads")));
        assert!(config.strict_validation);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = config(&[("INTAKE_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "INTAKE_MAX_CONNECTIONS",
                ..
            }
        ));

        let err = config(&[("INTAKE_STRICT_VALIDATION", "sometimes")]).unwrap_err();
        assert!(err.to_string().contains("INTAKE_STRICT_VALIDATION"));
    }
}
