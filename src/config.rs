//! Configuration management for Wakedeck
//!
//! Configuration is read once at startup from an INI file, layered with
//! `WAKEDECK__<SECTION>__<KEY>` environment overrides, deserialized into
//! typed sections and validated before the server starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::captcha::DEFAULT_VERIFY_URL;
use crate::wol::MacAddress;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.ini";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "WAKEDECK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Main configuration structure for the entire application
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub auth: AuthConfig,

    #[validate(nested)]
    pub network: NetworkConfig,

    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
}

impl Config {
    /// Load and validate configuration from `path`. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let name = path.to_string_lossy().into_owned();
        let cfg: Self = config::Config::builder()
            .add_source(config::File::new(&name, config::FileFormat::Ini).required(true))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Operator credential and captcha keys
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 1))]
    pub username: String,

    #[validate(length(min = 1))]
    pub password: String,

    #[validate(length(min = 1))]
    pub recaptcha_secret_key: String,

    #[validate(length(min = 1))]
    pub recaptcha_site_key: String,

    /// Verification endpoint (default: Google siteverify)
    #[serde(default = "default_verify_url")]
    #[validate(length(min = 1))]
    pub recaptcha_verify_url: String,
}

/// The controlled device
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkConfig {
    #[validate(custom(function = "validate_mac"))]
    pub mac_address: String,

    #[validate(length(min = 1))]
    pub broadcast_ip: String,

    /// UDP port for magic packets (default: 9)
    #[serde(default = "default_wol_port")]
    #[validate(range(min = 1))]
    pub wol_port: u16,

    /// Host probed for liveness
    #[validate(length(min = 1))]
    pub tcping_address: String,

    #[validate(range(min = 1))]
    pub tcping_port: u16,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Secondary remote viewer link shown on the dashboard
    #[serde(default)]
    pub novnc_url: Option<String>,

    /// `host:port` written into the RDP descriptor instead of the probe target
    #[serde(default)]
    pub rdp_address: Option<String>,
}

/// HTTP server and timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Port for the dashboard (default: 8080)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Probe timeout used while rendering the dashboard (default: 500)
    #[serde(default = "default_page_probe_timeout_ms")]
    #[validate(range(min = 1))]
    pub page_probe_timeout_ms: u64,

    /// Probe timeout used by the status endpoint (default: 2000)
    #[serde(default = "default_status_probe_timeout_ms")]
    #[validate(range(min = 1))]
    pub status_probe_timeout_ms: u64,

    /// Upper bound on a single UDP send (default: 1000)
    #[serde(default = "default_send_timeout_ms")]
    #[validate(range(min = 1))]
    pub send_timeout_ms: u64,

    /// Idle session lifetime in seconds (default: 1440)
    #[serde(default = "default_session_ttl_secs")]
    #[validate(range(min = 1))]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            page_probe_timeout_ms: default_page_probe_timeout_ms(),
            status_probe_timeout_ms: default_status_probe_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn validate_mac(value: &str) -> Result<(), ValidationError> {
    MacAddress::parse(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_mac_address"))
}

// Default value functions for serde

fn default_verify_url() -> String {
    DEFAULT_VERIFY_URL.into()
}
fn default_wol_port() -> u16 {
    9
}
fn default_device_name() -> String {
    "Device".into()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_page_probe_timeout_ms() -> u64 {
    500
}
fn default_status_probe_timeout_ms() -> u64 {
    2000
}
fn default_send_timeout_ms() -> u64 {
    1000
}
fn default_session_ttl_secs() -> u64 {
    1440
}

impl ServerConfig {
    pub fn page_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.page_probe_timeout_ms)
    }

    pub fn status_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.status_probe_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl NetworkConfig {
    /// Target written into the RDP descriptor.
    pub fn rdp_target(&self) -> String {
        match self.rdp_address.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => addr.to_string(),
            _ => format!("{}:{}", self.tcping_address, self.tcping_port),
        }
    }

    /// Remote viewer link, if one is configured.
    pub fn remote_viewer_url(&self) -> Option<&str> {
        self.novnc_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_LOCK;
    use std::io::Write;

    const SAMPLE: &str = "\
[auth]
username = admin
password = secret
recaptcha_secret_key = server-key
recaptcha_site_key = site-key

[network]
mac_address = AA:BB:CC:DD:EE:FF
broadcast_ip = 192.168.1.255
wol_port = 7
tcping_address = 192.168.1.20
tcping_port = 3389
device_name = Workstation
";

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".ini")
            .tempfile()
            .expect("failed to create temp config");
        file.write_all(contents.as_bytes()).expect("failed to write config");
        file
    }

    #[test]
    fn env_overrides_file_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(SAMPLE);
        std::env::set_var("WAKEDECK__NETWORK__WOL_PORT", "4009");
        std::env::set_var("WAKEDECK__SERVER__LISTEN_PORT", "9090");
        let cfg = Config::load(file.path());
        std::env::remove_var("WAKEDECK__NETWORK__WOL_PORT");
        std::env::remove_var("WAKEDECK__SERVER__LISTEN_PORT");

        let cfg = cfg.expect("config should load");
        assert_eq!(cfg.network.wol_port, 4009);
        assert_eq!(cfg.server.listen_port, 9090);
        assert_eq!(cfg.auth.username, "admin");
    }

    #[test]
    fn rdp_target_falls_back_to_probe_address() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(SAMPLE);
        let mut cfg = Config::load(file.path()).expect("config should load");
        assert_eq!(cfg.network.rdp_target(), "192.168.1.20:3389");

        cfg.network.rdp_address = Some("desk.lan:3390".into());
        assert_eq!(cfg.network.rdp_target(), "desk.lan:3390");

        cfg.network.rdp_address = Some("  ".into());
        assert_eq!(cfg.network.rdp_target(), "192.168.1.20:3389");
    }
}
