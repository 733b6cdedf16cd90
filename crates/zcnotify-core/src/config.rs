//! Configuration types for the zcnotify system
//!
//! This module defines all configuration structures used throughout the crate.
//! Configuration is read from a TOML file:
//!
//! ```toml
//! scan_period_seconds = 10
//! notify_types = ["email"]
//!
//! [zeroconf]
//! service = "_workstation._tcp"
//! domain = "local"
//!
//! [interfaces]
//! use = ["eth0"]
//! exclude = []
//! ip = ["ipv4"]
//!
//! [email.ops]
//! from = "zcnotify@example.org"
//! to = "ops@example.org"
//! ssl = true
//! server = "smtp.example.org"
//! password = "secret"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::dispatcher::ShutdownPolicy;
use crate::scheduler::RetryPolicy;
use crate::traits::{
    AddressFamily, BrowseQuery, DEFAULT_DOMAIN, DEFAULT_SERVICE, InterfaceSelection, NotifierKind,
};

/// SMTP port used when `ssl` is false and the server has no explicit port
pub const SMTP_PORT: u16 = 25;

/// SMTP submission port used when `ssl` is true and the server has no explicit port
pub const SMTP_SUBMISSION_PORT: u16 = 587;

/// Main zcnotify configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZcnotifyConfig {
    /// Seconds between scans; also the time budget of each scan
    ///
    /// 0 means unset and falls back to the default.
    #[serde(alias = "ScanPeriodSeconds", default = "default_scan_period_seconds")]
    pub scan_period_seconds: u64,

    /// Enabled notification sinks
    #[serde(alias = "NotifyTypes", default)]
    pub notify_types: Vec<NotifierKind>,

    /// What to browse for
    #[serde(alias = "Zeroconf", default)]
    pub zeroconf: ZeroconfConfig,

    /// Where to browse
    #[serde(alias = "Interfaces", default)]
    pub interfaces: InterfaceConfig,

    /// Email recipients, keyed by an arbitrary label
    #[serde(alias = "Email", default)]
    pub email: BTreeMap<String, EmailConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ZcnotifyConfig {
    /// Create a new configuration with defaults and the given notifiers
    pub fn new(notify_types: Vec<NotifierKind>) -> Self {
        Self {
            scan_period_seconds: default_scan_period_seconds(),
            notify_types,
            zeroconf: ZeroconfConfig::default(),
            interfaces: InterfaceConfig::default(),
            email: BTreeMap::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, crate::Error> {
        toml::from_str(contents)
            .map_err(|e| crate::Error::config(format!("Failed to parse config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.notify_types.is_empty() {
            return Err(crate::Error::config(
                "No notification types configured (notify_types is empty)",
            ));
        }

        self.zeroconf.validate()?;
        self.interfaces.validate()?;

        if self.notify_types.contains(&NotifierKind::Email) {
            if self.email.is_empty() {
                return Err(crate::Error::config(
                    "Email notifications enabled but no [email.*] recipients configured",
                ));
            }

            for (name, email) in &self.email {
                email.validate(name)?;
            }
        }

        self.engine.validate()?;

        Ok(())
    }

    /// Scan period (and per-scan discovery budget)
    pub fn scan_period(&self) -> Duration {
        match self.scan_period_seconds {
            0 => Duration::from_secs(default_scan_period_seconds()),
            secs => Duration::from_secs(secs),
        }
    }

    /// Resolve the browse parameters handed to the discoverer
    pub fn browse_query(&self) -> BrowseQuery {
        BrowseQuery {
            service_type: self.zeroconf.service().to_string(),
            domain: self.zeroconf.domain().to_string(),
            family: self.interfaces.address_family(),
            interfaces: InterfaceSelection {
                include: self.interfaces.use_.clone(),
                exclude: self.interfaces.exclude.clone(),
            },
        }
    }
}

fn default_scan_period_seconds() -> u64 {
    10
}

/// Service type and domain to browse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroconfConfig {
    #[serde(alias = "Service", default = "default_service")]
    pub service: String,

    #[serde(alias = "Domain", default = "default_domain")]
    pub domain: String,
}

impl ZeroconfConfig {
    /// Configured service, falling back to the default when blank
    pub fn service(&self) -> &str {
        if self.service.is_empty() {
            DEFAULT_SERVICE
        } else {
            &self.service
        }
    }

    /// Configured domain, falling back to the default when blank
    pub fn domain(&self) -> &str {
        if self.domain.is_empty() {
            DEFAULT_DOMAIN
        } else {
            &self.domain
        }
    }

    /// Only the workstation service in the local domain is supported
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.service() != DEFAULT_SERVICE {
            return Err(crate::Error::config(format!(
                "Unknown zeroconf service '{}'. Supported: {}",
                self.service, DEFAULT_SERVICE
            )));
        }

        if self.domain() != DEFAULT_DOMAIN {
            return Err(crate::Error::config(format!(
                "Unknown zeroconf domain '{}'. Supported: {}",
                self.domain, DEFAULT_DOMAIN
            )));
        }

        Ok(())
    }
}

impl Default for ZeroconfConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            domain: default_domain(),
        }
    }
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// IP version named in `[interfaces] ip`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

/// Interface and address-family selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interfaces to use; empty means all
    #[serde(rename = "use", alias = "Use", default)]
    pub use_: Vec<String>,

    /// Interfaces to leave out
    #[serde(alias = "Exclude", default)]
    pub exclude: Vec<String>,

    /// Address families; empty means both
    #[serde(alias = "Ip", default)]
    pub ip: Vec<IpFamily>,
}

impl InterfaceConfig {
    pub fn address_family(&self) -> AddressFamily {
        let v4 = self.ip.contains(&IpFamily::Ipv4);
        let v6 = self.ip.contains(&IpFamily::Ipv6);
        match (v4, v6) {
            (true, false) => AddressFamily::V4,
            (false, true) => AddressFamily::V6,
            _ => AddressFamily::Both,
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        for name in self.use_.iter().chain(self.exclude.iter()) {
            if name.trim().is_empty() {
                return Err(crate::Error::config("Interface names cannot be empty"));
            }
        }

        if !self.use_.is_empty() && self.use_.iter().all(|name| self.exclude.contains(name)) {
            return Err(crate::Error::config(
                "Every interface in [interfaces] use is also excluded",
            ));
        }

        Ok(())
    }
}

/// One email recipient
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(alias = "From")]
    pub from: String,
    #[serde(alias = "To")]
    pub to: String,

    /// Require STARTTLS (and port 587 by default)
    #[serde(alias = "Ssl", default)]
    pub ssl: bool,

    /// `host` or `host:port`
    #[serde(alias = "Server")]
    pub server: String,

    /// SMTP password; the `from` address is the login
    /// ⚠️ NEVER log this value
    #[serde(alias = "Password", default)]
    pub password: String,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("ssl", &self.ssl)
            .field("server", &self.server)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl EmailConfig {
    /// Basic sanity checks; full address syntax is checked by the email notifier
    pub fn validate(&self, name: &str) -> Result<(), crate::Error> {
        for (field, address) in [("from", &self.from), ("to", &self.to)] {
            let valid = address
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
            if !valid {
                return Err(crate::Error::config(format!(
                    "email config '{}': {} address '{}' is not an email address",
                    name, field, address
                )));
            }
        }

        if self.server.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "email config '{}': no server specified",
                name
            )));
        }

        self.smtp_endpoint()
            .map_err(|e| crate::Error::config(format!("email config '{}': {}", name, e)))?;

        Ok(())
    }

    /// Split `server` into host and port, applying the default port for `ssl`
    pub fn smtp_endpoint(&self) -> Result<(String, u16), crate::Error> {
        let default_port = if self.ssl {
            SMTP_SUBMISSION_PORT
        } else {
            SMTP_PORT
        };
        let server = self.server.trim();

        // Bracketed IPv6 literal, optionally with a port
        if let Some(rest) = server.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                crate::Error::config(format!("invalid server address '{}'", server))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(server, port)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(crate::Error::config(format!(
                        "invalid server address '{}'",
                        server
                    )));
                }
            };
            return Ok((host.to_string(), port));
        }

        match server.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                if host.is_empty() {
                    return Err(crate::Error::config(format!(
                        "invalid server address '{}'",
                        server
                    )));
                }
                Ok((host.to_string(), parse_port(server, port)?))
            }
            _ => Ok((server.to_string(), default_port)),
        }
    }
}

fn parse_port(server: &str, port: &str) -> Result<u16, crate::Error> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| crate::Error::config(format!("invalid port in server address '{}'", server)))
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retries of a failed browse within one cycle before giving up
    ///
    /// 0 makes the first discovery error fatal.
    #[serde(default)]
    pub discovery_retries: u32,

    /// Delay before the first retry (in seconds); doubles per attempt
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Upper bound on the retry delay (in seconds)
    #[serde(default = "default_max_retry_delay_secs")]
    pub max_retry_delay_secs: u64,

    /// Capacity of the scan monitoring channel
    ///
    /// When full, new monitoring events are dropped (with a warning log).
    #[serde(default = "default_monitor_channel_capacity")]
    pub monitor_channel_capacity: usize,

    /// What the dispatcher does with in-flight notifications at shutdown
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.discovery_retries > 0 && self.retry_delay_secs == 0 {
            return Err(crate::Error::config(
                "retry_delay_secs must be > 0 when discovery_retries is set",
            ));
        }

        if self.max_retry_delay_secs < self.retry_delay_secs {
            return Err(crate::Error::config(
                "max_retry_delay_secs must be >= retry_delay_secs",
            ));
        }

        if self.monitor_channel_capacity == 0 {
            return Err(crate::Error::config("monitor_channel_capacity must be > 0"));
        }

        if let ShutdownPolicy::Drain { timeout_secs: 0 } = self.shutdown_policy {
            return Err(crate::Error::config("drain timeout_secs must be > 0"));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.discovery_retries,
            initial_delay: Duration::from_secs(self.retry_delay_secs),
            max_delay: Duration::from_secs(self.max_retry_delay_secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_retries: 0,
            retry_delay_secs: default_retry_delay_secs(),
            max_retry_delay_secs: default_max_retry_delay_secs(),
            monitor_channel_capacity: default_monitor_channel_capacity(),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn default_max_retry_delay_secs() -> u64 {
    30
}

fn default_monitor_channel_capacity() -> usize {
    64
}
