//! Configuration provider
//!
//! Properties are a flat map of dotted keys (`session.create`,
//! `security.csrf.enabled`, ...). TOML documents are flattened into that
//! shape, so both of these set the same property:
//!
//! ```toml
//! session.inactivityPeriodAllowed = 600
//!
//! [session]
//! inactivityPeriodAllowed = 600
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use rudiment_registry::Component;
use tracing::debug;

/// Property names understood by the runtime
pub mod keys {
    pub const SESSION_CREATE: &str = "session.create";
    pub const SESSION_INACTIVITY_PERIOD: &str = "session.inactivityPeriodAllowed";
    pub const SESSION_COOKIE_NAME: &str = "session.cookieName";
    pub const SESSION_CORRELATION_HEADER: &str = "session.correlationHeader";
    pub const SESSION_MAX_SESSIONS: &str = "session.maxSessions";
    pub const CSRF_ENABLED: &str = "security.csrf.enabled";
    pub const CSRF_STATELESS: &str = "security.csrf.stateless";
    pub const CSRF_COOKIE_NAME: &str = "security.csrf.tokenCookieName";
    pub const CSRF_HEADER_NAME: &str = "security.csrf.tokenHttpHeaderName";
    pub const SERVER_HOST: &str = "server.host";
    pub const SERVER_PORT: &str = "server.port";
    pub const SERVER_MAX_BODY_SIZE: &str = "server.maxBodySize";
}

/// Default name of the session cookie
pub const DEFAULT_SESSION_COOKIE: &str = "RSID";
/// Default name of the CSRF token cookie
pub const DEFAULT_CSRF_COOKIE: &str = "XSRF-TOKEN";
/// Default name of the header echoing the CSRF token
pub const DEFAULT_CSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Errors raised while loading or reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing configuration property: {0}")]
    MissingProperty(String),

    #[error("Invalid value '{value}' for property {name}: expected {expected}")]
    InvalidProperty {
        name: String,
        value: String,
        expected: &'static str,
    },
}

/// Flat property map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    properties: BTreeMap<String, String>,
}

impl Config {
    /// Empty configuration; every typed accessor falls back to its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(document)?;
        let mut properties = BTreeMap::new();
        flatten(None, &table, &mut properties);
        debug!("Loaded {} configuration properties", properties.len());
        Ok(Self { properties })
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Set a property, replacing any previous value
    pub fn with_property(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl ToString) {
        self.properties.insert(name.into(), value.to_string());
    }

    /// Raw property value
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Iterate over all properties in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn string_property(&self, name: &str) -> Result<&str, ConfigError> {
        self.property(name)
            .ok_or_else(|| ConfigError::MissingProperty(name.to_string()))
    }

    pub fn bool_property(&self, name: &str) -> Result<bool, ConfigError> {
        let value = self.string_property(name)?;
        match value.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(invalid(name, value, "true or false")),
        }
    }

    pub fn int_property(&self, name: &str) -> Result<i64, ConfigError> {
        let value = self.string_property(name)?;
        value
            .trim()
            .parse()
            .map_err(|_| invalid(name, value, "an integer"))
    }

    /// Like [`string_property`](Self::string_property) but a missing property yields `default`
    pub fn string_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.property(name).unwrap_or(default)
    }

    /// Missing yields `default`; a present but malformed value is still an error
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        if self.contains(name) {
            self.bool_property(name)
        } else {
            Ok(default)
        }
    }

    /// Missing yields `default`; a present but malformed value is still an error
    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, ConfigError> {
        if self.contains(name) {
            self.int_property(name)
        } else {
            Ok(default)
        }
    }

    /// Non-negative integer property
    fn unsigned_or(&self, name: &str, default: u64) -> Result<u64, ConfigError> {
        let value = self.int_or(name, default as i64)?;
        u64::try_from(value).map_err(|_| invalid(name, &value.to_string(), "a non-negative integer"))
    }

    /// Session behaviour settings
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let correlation_header = self
            .property(keys::SESSION_CORRELATION_HEADER)
            .map(str::trim)
            .filter(|header| !header.is_empty())
            .map(str::to_string);

        Ok(SessionSettings {
            create: self.bool_or(keys::SESSION_CREATE, true)?,
            inactivity_period: self.unsigned_or(keys::SESSION_INACTIVITY_PERIOD, 1800)?,
            cookie_name: self
                .string_or(keys::SESSION_COOKIE_NAME, DEFAULT_SESSION_COOKIE)
                .to_string(),
            correlation_header,
            max_sessions: self.unsigned_or(keys::SESSION_MAX_SESSIONS, 100_000)? as usize,
        })
    }

    /// CSRF protection settings
    pub fn csrf_settings(&self) -> Result<CsrfSettings, ConfigError> {
        Ok(CsrfSettings {
            enabled: self.bool_or(keys::CSRF_ENABLED, false)?,
            stateless: self.bool_or(keys::CSRF_STATELESS, false)?,
            cookie_name: self
                .string_or(keys::CSRF_COOKIE_NAME, DEFAULT_CSRF_COOKIE)
                .to_string(),
            header_name: self
                .string_or(keys::CSRF_HEADER_NAME, DEFAULT_CSRF_HEADER)
                .to_string(),
        })
    }

    /// Listener settings
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();

        let host = match self.property(keys::SERVER_HOST) {
            Some(host) => host
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| invalid(keys::SERVER_HOST, host, "an IP address"))?,
            None => defaults.bind_address.ip(),
        };
        let port = self.unsigned_or(keys::SERVER_PORT, u64::from(defaults.bind_address.port()))?;
        let port = u16::try_from(port)
            .map_err(|_| invalid(keys::SERVER_PORT, &port.to_string(), "a port number"))?;

        Ok(ServerConfig {
            bind_address: SocketAddr::new(host, port),
            max_body_size: self
                .unsigned_or(keys::SERVER_MAX_BODY_SIZE, defaults.max_body_size as u64)?
                as usize,
        })
    }
}

impl Component for Config {}

fn invalid(name: &str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidProperty {
        name: name.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn flatten(prefix: Option<&str>, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            toml::Value::Table(nested) => flatten(Some(&name), nested, out),
            other => {
                out.insert(name, scalar(other));
            }
        }
    }
}

fn scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        toml::Value::Table(_) => String::new(),
    }
}

/// Session settings derived from [`Config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Create sessions for requests without one
    pub create: bool,
    /// Allowed idle time in seconds
    pub inactivity_period: u64,
    pub cookie_name: String,
    /// Header carrying a client-generated correlation key; disabled when `None`
    pub correlation_header: Option<String>,
    pub max_sessions: usize,
}

/// CSRF settings derived from [`Config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfSettings {
    pub enabled: bool,
    /// Double-submit without server-side state
    pub stateless: bool,
    pub cookie_name: String,
    pub header_name: String,
}

/// Configuration for the HTTP listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Maximum request body size
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}
