//! Service configuration - environment loading
//!
//! Configuration is loaded from environment variables:
//! - `OPERATIONAL_MONGO_URI`: store connection URI (default: mongodb://localhost:27017/littlesteps_db)
//! - `OPERATIONAL_DB_NAME`: database name, overriding the one in the URI path
//! - `STORAGE_BACKEND`: `mongo` (default) or `memory`
//! - `REQUEST_TIMEOUT_SECS`: bound on every storage operation (default: 5)
//! - `VALIDATION_MODE`: `strict` or `permissive` for every resource
//! - `VALIDATION_MODE_<RESOURCE>`: per-resource override for a registered
//!   resource, e.g. `VALIDATION_MODE_STAFF`
//! - `NULL_FIELD_POLICY`: `unset` (default) or `reject`
//! - `BIND_ADDR`: listen address (default: 0.0.0.0:5001)
//! - `CORS_PERMISSIVE`: allow any origin (default: false)

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{NullPolicy, SchemaRegistry, ValidationMode};

pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017/littlesteps_db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 5001);

const MODE_OVERRIDE_PREFIX: &str = "VALIDATION_MODE_";

/// Configuration error
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: String,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &str, reason: impl Into<String>) -> Self {
        Self {
            var: var.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Which storage backend the connector drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Mongo,
    /// Process-local, non-durable; development and tests only
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Storage connector configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub uri: String,
    pub database: Option<String>,
    pub timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mongo,
            uri: DEFAULT_MONGO_URI.to_string(),
            database: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl StorageConfig {
    /// Connection URI with any password masked, safe for logs.
    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }
}

fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|i| i + 3) else {
        return uri.to_owned();
    };
    let rest = &uri[scheme_end..];
    let Some(at) = rest.rfind('@') else {
        return uri.to_owned();
    };
    let userinfo = &rest[..at];
    let user = userinfo.split(':').next().unwrap_or_default();
    format!("{}{}:***{}", &uri[..scheme_end], user, &rest[at..])
}

/// Validation policy configuration
#[derive(Debug, Clone, Default)]
pub struct ValidationConfig {
    /// Mode applied to every resource without an override
    pub default_mode: Option<ValidationMode>,
    /// Per-resource overrides keyed by resource name (lowercase)
    pub overrides: BTreeMap<String, ValidationMode>,
    pub null_policy: NullPolicy,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Allow permissive CORS (default: false = localhost only)
    pub cors_permissive: bool,
    pub storage: StorageConfig,
    pub validation: ValidationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            cors_permissive: false,
            storage: StorageConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create config from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Create config from explicit variables (for testing)
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        let mut config = Self::default();

        if let Some(addr) = vars.get("BIND_ADDR") {
            config.bind_addr = parse_var("BIND_ADDR", addr)?;
        }
        if let Some(flag) = vars.get("CORS_PERMISSIVE") {
            config.cors_permissive = parse_bool("CORS_PERMISSIVE", flag)?;
        }

        if let Some(uri) = vars.get("OPERATIONAL_MONGO_URI") {
            config.storage.uri = uri.clone();
        }
        config.storage.database = vars.get("OPERATIONAL_DB_NAME").cloned();
        if let Some(backend) = vars.get("STORAGE_BACKEND") {
            config.storage.backend = parse_var("STORAGE_BACKEND", backend)?;
        }
        if let Some(secs) = vars.get("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", secs)?;
            if secs == 0 {
                return Err(ConfigError::new("REQUEST_TIMEOUT_SECS", "must be at least 1"));
            }
            config.storage.timeout = Duration::from_secs(secs);
        }

        if let Some(mode) = vars.get("VALIDATION_MODE") {
            config.validation.default_mode = Some(parse_var("VALIDATION_MODE", mode)?);
        }
        if let Some(policy) = vars.get("NULL_FIELD_POLICY") {
            config.validation.null_policy = parse_var("NULL_FIELD_POLICY", policy)?;
        }
        let registry = SchemaRegistry::builtin();
        for (var, value) in &vars {
            if let Some(resource) = var.strip_prefix(MODE_OVERRIDE_PREFIX) {
                let resource = resource.to_ascii_lowercase();
                if registry.get(&resource).is_none() {
                    return Err(ConfigError::new(
                        var,
                        format!("unknown resource type '{}'", resource),
                    ));
                }
                let mode = parse_var(var, value)?;
                config.validation.overrides.insert(resource, mode);
            }
        }

        Ok(config)
    }
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::new(var, e.to_string()))
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::new(var, format!("'{}' is not a boolean", other))),
    }
}
