//! Configuration for the archer agent.
//!
//! TOML files layered over built-in defaults and `ARCHER_` environment
//! variables, validated and translated into [`archer_core::AgentConfig`]
//! and [`archer_api::KeystoneAuth`]. The binary only ever sees the
//! translated types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use archer_api::{DeviceKind, KeystoneAuth, RetryPolicy, TlsMode, TransportConfig};
use archer_core::{AgentConfig, VcmpConfig};
use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable prefix; `__` separates nested keys.
pub const ENV_PREFIX: &str = "ARCHER_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("missing {field}: required for {what}")]
    Missing { field: String, what: &'static str },

    #[error("no credentials configured for {what}")]
    NoCredentials { what: &'static str },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl fmt::Display) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration document.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub openstack: OpenStackSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DefaultSection {
    /// Host name the agent registers as. Falls back to the machine hostname.
    pub host: Option<String>,

    pub availability_zone: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseSection {
    /// Postgres connection URL.
    pub connection: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            connection: None,
            max_connections: default_max_connections(),
        }
    }
}

/// `[agent]` section. Durations are humantime strings (`"5m"`, `"24h"`).
#[derive(Debug, Deserialize, Serialize)]
pub struct AgentSection {
    /// Stateful-session device URLs, usually the two members of a pair.
    #[serde(default)]
    pub devices: Vec<String>,

    #[serde(default)]
    pub vcmps: Vec<VcmpSection>,

    pub physical_network: Option<String>,

    pub physical_interface: Option<String>,

    #[serde(default = "default_pending_sync_interval")]
    pub pending_sync_interval: String,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_retry_duration")]
    pub max_retry_duration: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Skip certificate verification. Appliances ship self-signed certs.
    #[serde(default)]
    pub insecure: bool,

    /// CA bundle to verify devices and the network API against.
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_job_queue_size")]
    pub job_queue_size: usize,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,

    #[serde(default = "default_listener_timeout")]
    pub listener_timeout: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            vcmps: Vec::new(),
            physical_network: None,
            physical_interface: None,
            pending_sync_interval: default_pending_sync_interval(),
            cleanup_interval: default_cleanup_interval(),
            max_retries: default_max_retries(),
            max_retry_duration: default_max_retry_duration(),
            request_timeout: default_request_timeout(),
            insecure: false,
            ca_cert: None,
            job_queue_size: default_job_queue_size(),
            shutdown_timeout: default_shutdown_timeout(),
            listener_timeout: default_listener_timeout(),
        }
    }
}

/// A VCMP chassis entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VcmpSection {
    pub url: String,

    /// `bigip` or `f5os`.
    #[serde(default = "default_vcmp_kind")]
    pub kind: String,

    /// Guest (or F5OS tenant) name of this agent's device on the chassis.
    pub guest: Option<String>,

    /// Interface or LAG the chassis VLANs are trunked on.
    pub interface: Option<String>,
}

/// Keystone v3 password authentication for the network API.
#[derive(Deserialize, Serialize)]
pub struct OpenStackSection {
    pub auth_url: Option<String>,

    pub username: Option<String>,

    /// Plaintext in the file; held as a `SecretString` once translated.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "default_domain")]
    pub user_domain_name: String,

    pub project_name: Option<String>,

    #[serde(default = "default_domain")]
    pub project_domain_name: String,

    pub region: Option<String>,

    /// Use this network endpoint instead of the catalog entry.
    pub network_endpoint: Option<String>,
}

impl Default for OpenStackSection {
    fn default() -> Self {
        Self {
            auth_url: None,
            username: None,
            password: None,
            user_domain_name: default_domain(),
            project_name: None,
            project_domain_name: default_domain(),
            region: None,
            network_endpoint: None,
        }
    }
}

impl fmt::Debug for OpenStackSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStackSection")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("user_domain_name", &self.user_domain_name)
            .field("project_name", &self.project_name)
            .field("project_domain_name", &self.project_domain_name)
            .field("region", &self.region)
            .field("network_endpoint", &self.network_endpoint)
            .finish()
    }
}

fn default_max_connections() -> u32 {
    10
}
fn default_pending_sync_interval() -> String {
    "5m".into()
}
fn default_cleanup_interval() -> String {
    "24h".into()
}
fn default_max_retries() -> u32 {
    5
}
fn default_max_retry_duration() -> String {
    "60s".into()
}
fn default_request_timeout() -> String {
    "60s".into()
}
fn default_job_queue_size() -> usize {
    32
}
fn default_shutdown_timeout() -> String {
    "30s".into()
}
fn default_listener_timeout() -> String {
    "60s".into()
}
fn default_vcmp_kind() -> String {
    "bigip".into()
}
fn default_domain() -> String {
    "Default".into()
}

// ── Config loading ──────────────────────────────────────────────────

/// Figment for the given files, in order, under the `ARCHER_` environment.
pub fn figment(files: &[PathBuf]) -> Figment {
    figment_with(files, Env::prefixed(ENV_PREFIX).split("__"))
}

/// Same layering with an explicit top provider in place of the environment.
pub fn figment_with(files: &[PathBuf], overrides: impl Provider) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    for file in files {
        figment = figment.merge(Toml::file(file));
    }
    figment.merge(overrides)
}

/// Load the configuration from files and the environment.
///
/// Files that do not exist are skipped; later files override earlier ones.
pub fn load(files: &[PathBuf]) -> Result<Config, ConfigError> {
    Ok(figment(files).extract()?)
}

impl Config {
    /// Render the effective configuration as TOML (the password is never
    /// written out).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Agent host name: configured, or the machine hostname.
    pub fn host(&self) -> Result<String, ConfigError> {
        if let Some(host) = &self.default.host {
            if host.trim().is_empty() {
                return Err(ConfigError::invalid("default.host", "must not be empty"));
            }
            return Ok(host.clone());
        }
        let name = hostname::get()
            .map_err(|e| ConfigError::invalid("default.host", format!("hostname lookup failed: {e}")))?;
        Ok(name.to_string_lossy().into_owned())
    }

    /// Postgres connection URL.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        match self.database.connection.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ConfigError::Missing {
                field: "database.connection".into(),
                what: "the agent store",
            }),
        }
    }

    /// Validate the `[default]` and `[agent]` sections into the runtime
    /// agent configuration.
    pub fn to_agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let agent = &self.agent;

        let physical_network = agent
            .physical_network
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "agent.physical_network".into(),
                what: "segment lookup",
            })?;

        if agent.devices.is_empty() {
            return Err(ConfigError::Missing {
                field: "agent.devices".into(),
                what: "device sessions",
            });
        }
        let devices = agent
            .devices
            .iter()
            .map(|raw| parse_url("agent.devices", raw))
            .collect::<Result<Vec<_>, _>>()?;
        let vcmps = agent
            .vcmps
            .iter()
            .map(VcmpSection::to_vcmp_config)
            .collect::<Result<Vec<_>, _>>()?;

        if agent.max_retries == 0 {
            return Err(ConfigError::invalid("agent.max_retries", "must be at least 1"));
        }
        if agent.job_queue_size == 0 {
            return Err(ConfigError::invalid("agent.job_queue_size", "must be at least 1"));
        }

        let mut config = AgentConfig::new(self.host()?, physical_network);
        config.availability_zone = self.default.availability_zone.clone();
        config.physical_interface = agent.physical_interface.clone();
        config.devices = devices;
        config.vcmps = vcmps;
        config.transport = self.transport()?;
        config.retry = RetryPolicy {
            max_attempts: agent.max_retries,
            max_elapsed: parse_duration("agent.max_retry_duration", &agent.max_retry_duration)?,
            ..RetryPolicy::default()
        };
        config.pending_sync_interval =
            parse_interval("agent.pending_sync_interval", &agent.pending_sync_interval)?;
        config.cleanup_interval = parse_interval("agent.cleanup_interval", &agent.cleanup_interval)?;
        config.job_queue_size = agent.job_queue_size;
        config.shutdown_timeout = parse_duration("agent.shutdown_timeout", &agent.shutdown_timeout)?;
        config.listener_timeout =
            parse_interval("agent.listener_timeout", &agent.listener_timeout)?;
        Ok(config)
    }

    /// TLS and timeout settings shared by every HTTP client.
    pub fn transport(&self) -> Result<TransportConfig, ConfigError> {
        let tls = match (&self.agent.ca_cert, self.agent.insecure) {
            (Some(_), true) => {
                return Err(ConfigError::invalid(
                    "agent.ca_cert",
                    "cannot be combined with agent.insecure",
                ));
            }
            (Some(path), false) => TlsMode::CustomCa(path.clone()),
            (None, true) => TlsMode::DangerAcceptInvalid,
            (None, false) => TlsMode::System,
        };
        Ok(TransportConfig {
            tls,
            timeout: parse_interval("agent.request_timeout", &self.agent.request_timeout)?,
        })
    }

    /// Keystone credentials for the network API client.
    pub fn keystone_auth(&self) -> Result<KeystoneAuth, ConfigError> {
        let os = &self.openstack;
        let auth_url = os.auth_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "openstack.auth_url".into(),
            what: "the network API",
        })?;
        let (Some(username), Some(password)) = (&os.username, &os.password) else {
            return Err(ConfigError::NoCredentials {
                what: "the network API",
            });
        };
        let project_name = os.project_name.clone().ok_or_else(|| ConfigError::Missing {
            field: "openstack.project_name".into(),
            what: "the network API",
        })?;
        let endpoint_override = os
            .network_endpoint
            .as_deref()
            .map(|raw| parse_url("openstack.network_endpoint", raw))
            .transpose()?;

        Ok(KeystoneAuth {
            auth_url: parse_url("openstack.auth_url", auth_url)?,
            username: username.clone(),
            password: SecretString::from(password.clone()),
            user_domain_name: os.user_domain_name.clone(),
            project_name,
            project_domain_name: os.project_domain_name.clone(),
            region: os.region.clone(),
            endpoint_override,
        })
    }
}

impl VcmpSection {
    fn to_vcmp_config(&self) -> Result<VcmpConfig, ConfigError> {
        let kind = match self.kind.to_ascii_lowercase().as_str() {
            "bigip" => DeviceKind::BigIp,
            "f5os" => DeviceKind::F5Os,
            other => {
                return Err(ConfigError::invalid(
                    "agent.vcmps.kind",
                    format!("unknown device kind '{other}' (expected bigip or f5os)"),
                ));
            }
        };
        Ok(VcmpConfig {
            url: parse_url("agent.vcmps.url", &self.url)?,
            kind,
            guest: self.guest.clone(),
            interface: self.interface.clone(),
        })
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::invalid(field, format!("'{raw}': {e}")))
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::invalid(field, format!("'{raw}': {e}")))
}

/// A duration that drives a timer; zero would spin.
fn parse_interval(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(field, raw)?;
    if duration.is_zero() {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(duration)
}
