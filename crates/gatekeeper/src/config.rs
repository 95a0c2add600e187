//! Gatekeeper configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is
//! secret, so Debug output is safe to log.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default grace period for in-flight requests on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Path of the JWKS document relative to the issuer.
pub const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// OIDC bearer-token settings. Present only when authentication is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcConfig {
    /// Expected `aud` claim (exact match).
    pub audience: String,

    /// Expected `iss` claim (exact match).
    pub issuer: String,

    /// JWKS endpoint (default: issuer + `/.well-known/jwks.json`).
    pub jwks_url: String,

    /// Path prefixes exempt from authentication, in match order.
    pub public_url_prefixes: Vec<String>,

    /// Leeway for `exp`, `nbf` and `iat`.
    pub clock_skew: Duration,

    /// Transport timeout for the JWKS client. `None` keeps client defaults.
    pub jwks_http_timeout: Option<Duration>,
}

/// Gatekeeper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Grace period before forced exit after a shutdown signal.
    pub shutdown_timeout_seconds: u64,

    pub log_format: LogFormat,

    /// Static fields added to every request log line, in order.
    pub log_fields: Vec<(String, String)>,

    pub disable_request_id: bool,
    pub disable_real_ip: bool,
    pub disable_heartbeat: bool,

    /// `None` when `DISABLE_OIDC` is set.
    pub oidc: Option<OidcConfig>,

    /// Claim name → request context key, in application order.
    pub claim_context_mapping: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid boolean for {name}: '{value}'")]
    InvalidBool { name: String, value: String },

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid log configuration: {0}")]
    InvalidLogConfig(String),

    #[error("Invalid claim context mapping: {0}")]
    InvalidClaimMapping(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let shutdown_timeout_seconds = match vars.get("SHUTDOWN_TIMEOUT_SECONDS") {
            Some(value_str) => value_str.parse::<u64>().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "SHUTDOWN_TIMEOUT_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        };

        let log_format = match vars.get("LOG_FORMAT").map(|s| s.to_ascii_lowercase()) {
            None => LogFormat::Json,
            Some(format) if format == "json" => LogFormat::Json,
            Some(format) if format == "pretty" => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::InvalidLogConfig(format!(
                    "LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                    other
                )))
            }
        };

        let log_fields = match vars.get("LOG_FIELDS") {
            Some(raw) => parse_pairs(raw).map_err(|entry| {
                ConfigError::InvalidLogConfig(format!(
                    "LOG_FIELDS entries must be key=value, got '{}'",
                    entry
                ))
            })?,
            None => Vec::new(),
        };

        let claim_context_mapping = match vars.get("CLAIM_CONTEXT_MAPPING") {
            Some(raw) => parse_pairs(raw).map_err(|entry| {
                ConfigError::InvalidClaimMapping(format!(
                    "CLAIM_CONTEXT_MAPPING entries must be claim=key, got '{}'",
                    entry
                ))
            })?,
            None => Vec::new(),
        };

        let oidc = if parse_bool(vars, "DISABLE_OIDC")? {
            None
        } else {
            Some(parse_oidc(vars)?)
        };

        Ok(Config {
            bind_address,
            shutdown_timeout_seconds,
            log_format,
            log_fields,
            disable_request_id: parse_bool(vars, "DISABLE_REQUEST_ID")?,
            disable_real_ip: parse_bool(vars, "DISABLE_REAL_IP")?,
            disable_heartbeat: parse_bool(vars, "DISABLE_HEARTBEAT")?,
            oidc,
            claim_context_mapping,
        })
    }
}

fn parse_oidc(vars: &HashMap<String, String>) -> Result<OidcConfig, ConfigError> {
    let required = |name: &str| {
        vars.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
    };

    let audience = required("OIDC_AUDIENCE")?;
    let issuer = required("OIDC_ISSUER")?;

    let jwks_url = vars
        .get("OIDC_JWKS_URL")
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| format!("{}{}", issuer.trim_end_matches('/'), JWKS_WELL_KNOWN_PATH));

    let public_url_prefixes = vars
        .get("PUBLIC_URL_PREFIXES")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Parse JWT clock skew tolerance with validation
    let clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
        let value: i64 = value_str.parse().map_err(|e| {
            ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                value_str, e
            ))
        })?;

        if value <= 0 {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                value
            )));
        }

        let value = value.unsigned_abs();
        if value > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                value
            )));
        }

        Duration::from_secs(value)
    } else {
        DEFAULT_CLOCK_SKEW
    };

    let jwks_http_timeout = match vars.get("JWKS_HTTP_TIMEOUT_SECONDS") {
        Some(value_str) => {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "JWKS_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;
            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "JWKS_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }
            Some(Duration::from_secs(value))
        }
        None => None,
    };

    Ok(OidcConfig {
        audience,
        issuer,
        jwks_url,
        public_url_prefixes,
        clock_skew,
        jwks_http_timeout,
    })
}

/// Unset means `false`.
fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                name: name.to_string(),
                value: v,
            }),
        },
    }
}

/// Parse `k=v,k2=v2`, keeping order. Returns the offending entry on error.
fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(entry.to_string()),
        })
        .collect()
}
