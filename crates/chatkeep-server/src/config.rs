use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use chatkeep_api::token::{DEFAULT_ISSUER, DEFAULT_VALIDITY, TokenSettings};

/// Placeholder JWT secrets that MUST NOT be used in production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "secret",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("CHATKEEP_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod") => {
                Self::Production
            }
            _ => Self::Development,
        }
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "chatkeep=debug,tower_http=debug",
            Self::Production => "chatkeep=info,tower_http=info",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHATKEEP_JWT_SECRET is unset or empty")]
    MissingSecret,

    #[error("CHATKEEP_JWT_SECRET is still a placeholder value")]
    PlaceholderSecret,

    #[error("CHATKEEP_PORT is not a valid port: {0}")]
    InvalidPort(String),

    #[error("CHATKEEP_JWT_EXPIRY_MULTIPLIER must be a positive integer: {0}")]
    InvalidMultiplier(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub token: TokenSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let environment = Environment::parse(var("CHATKEEP_ENV").as_deref());

        let secret = var("CHATKEEP_JWT_SECRET").ok_or(ConfigError::MissingSecret)?;
        if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
            if environment == Environment::Production {
                return Err(ConfigError::PlaceholderSecret);
            }
            warn!("CHATKEEP_JWT_SECRET is a placeholder; never use it in production");
        }

        let validity = match var("CHATKEEP_JWT_EXPIRY") {
            None => DEFAULT_VALIDITY,
            Some(raw) => parse_duration(&raw).filter(|d| !d.is_zero()).unwrap_or_else(|| {
                warn!("Unparsable CHATKEEP_JWT_EXPIRY {:?}, falling back to 24h", raw);
                DEFAULT_VALIDITY
            }),
        };

        let expiry_multiplier = match var("CHATKEEP_JWT_EXPIRY_MULTIPLIER") {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|m| *m > 0)
                .ok_or(ConfigError::InvalidMultiplier(raw))?,
        };

        let port = match var("CHATKEEP_PORT") {
            None => 8080,
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
        };

        Ok(Self {
            environment,
            host: var("CHATKEEP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("CHATKEEP_DB_PATH")
                .unwrap_or_else(|| "chatkeep.db".into())
                .into(),
            token: TokenSettings {
                secret,
                validity,
                expiry_multiplier,
                issuer: var("CHATKEEP_JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.into()),
            },
        })
    }
}

/// Parse a Go-style duration such as `24h`, `90m`, `1h30m` or `1.5h`.
/// A bare number is rejected, as is a negative value.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("CHATKEEP_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_path, PathBuf::from("chatkeep.db"));
        assert_eq!(cfg.token.validity, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.token.expiry_multiplier, 1);
        assert_eq!(cfg.token.issuer, "chatkeep");
    }

    #[test]
    fn missing_or_blank_secret_is_fatal() {
        assert_eq!(config(&[]).err(), Some(ConfigError::MissingSecret));
        assert_eq!(
            config(&[("CHATKEEP_JWT_SECRET", "  ")]).err(),
            Some(ConfigError::MissingSecret)
        );
    }

    #[test]
    fn placeholder_secret_only_fatal_in_production() {
        assert!(config(&[("CHATKEEP_JWT_SECRET", "dev-secret-change-me")]).is_ok());
        assert_eq!(
            config(&[
                ("CHATKEEP_JWT_SECRET", "dev-secret-change-me"),
                ("CHATKEEP_ENV", "production"),
            ])
            .err(),
            Some(ConfigError::PlaceholderSecret)
        );
    }

    #[test]
    fn unparsable_expiry_falls_back_to_a_day() {
        let cfg = config(&[("CHATKEEP_JWT_SECRET", "x"), ("CHATKEEP_JWT_EXPIRY", "soon")]).unwrap();
        assert_eq!(cfg.token.validity, DEFAULT_VALIDITY);

        let cfg = config(&[("CHATKEEP_JWT_SECRET", "x"), ("CHATKEEP_JWT_EXPIRY", "0s")]).unwrap();
        assert_eq!(cfg.token.validity, DEFAULT_VALIDITY);

        let cfg = config(&[("CHATKEEP_JWT_SECRET", "x"), ("CHATKEEP_JWT_EXPIRY", "90m")]).unwrap();
        assert_eq!(cfg.token.validity, Duration::from_secs(90 * 60));
    }

    #[test]
    fn bad_port_and_multiplier_are_errors() {
        assert!(matches!(
            config(&[("CHATKEEP_JWT_SECRET", "x"), ("CHATKEEP_PORT", "http")]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            config(&[("CHATKEEP_JWT_SECRET", "x"), ("CHATKEEP_JWT_EXPIRY_MULTIPLIER", "0")]),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        let cfg = config(&[
            ("CHATKEEP_JWT_SECRET", "x"),
            ("CHATKEEP_JWT_EXPIRY_MULTIPLIER", "30"),
        ])
        .unwrap();
        assert_eq!(cfg.token.expiry_multiplier, 30);
    }

    #[test]
    fn go_style_durations() {
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("3600s"), Some(Duration::from_secs(3_600)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("-1h"), None);
        assert_eq!(parse_duration("1d"), None);
        assert_eq!(parse_duration("h"), None);
    }

    #[test]
    fn environment_parsing() {
        assert_eq!(Environment::parse(None), Environment::Development);
        assert_eq!(Environment::parse(Some("PRODUCTION")), Environment::Production);
        assert_eq!(Environment::parse(Some("staging")), Environment::Development);
        assert_eq!(
            Environment::Production.default_log_filter(),
            "chatkeep=info,tower_http=info"
        );
    }
}
