use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Fallback `User-Agent` sent upstream when the caller does not provide one.
pub const DEFAULT_USER_AGENT: &str = "TambayanProxy/1.0";

/// Default upstream for the derived PLDT/Akamai route.
pub const DEFAULT_PLDT_TEMPLATE: &str =
    "https://qp-pldt-live-{group}-prod.akamaized.net/out/u/{file}";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub pldt: PldtConfig,

    #[serde(default)]
    pub license: LicenseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Also mount every route under `/api` (paths used by older player builds)
    #[serde(default = "default_true")]
    pub api_prefix: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Upstream host suffixes the relay may forward to
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// `User-Agent` used when the caller sends none
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout for upstream fetches in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum idle time between upstream reads in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Total attempts for body-less upstream fetches (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step between attempts in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Detect Content-Type for playlists/segments the upstream mislabels
    #[serde(default = "default_true")]
    pub sniff_content_type: bool,

    /// Environment variable holding a token sent upstream as `x-auth-token`
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: Option<String>,

    /// Static headers added to every upstream request
    #[serde(default)]
    pub upstream_headers: BTreeMap<String, String>,
}

fn default_allowed_hosts() -> Vec<String> {
    [
        "akamaized.net",
        "amagi.com",
        "amagi.tv",
        "skygo.mn",
        "convrgelive.nathcreqtives.com",
        "convrgkey.nathcreqtives.com",
        "proxy.nathcreqtives.com",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    1
}
fn default_retry_backoff() -> u64 {
    250
}
fn default_auth_token_env() -> Option<String> {
    Some("AUTH_TOKEN".to_string())
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            sniff_content_type: true,
            auth_token_env: default_auth_token_env(),
            upstream_headers: BTreeMap::new(),
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PldtConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upstream URL with `{group}` and `{file}` placeholders
    #[serde(default = "default_pldt_template")]
    pub upstream_template: String,
}

fn default_pldt_template() -> String {
    DEFAULT_PLDT_TEMPLATE.to_string()
}

impl Default for PldtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upstream_template: default_pldt_template(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LicenseConfig {
    /// Channels whose keys come from `<CHANNEL>_KEY_ID` / `<CHANNEL>_KEY`
    #[serde(default)]
    pub channels: Vec<String>,

    /// Pick up every `<X>_KEY_ID` / `<X>_KEY` pair found in the environment
    #[serde(default = "default_true")]
    pub discover_env: bool,

    /// Keys kept in the config file itself
    #[serde(default)]
    pub static_keys: Vec<StaticKeyConfig>,

    /// Pair served when no channel is requested; falls back to
    /// `CLEARKEY_KEY_ID` / `CLEARKEY_KEY`
    #[serde(default)]
    pub default_key: Option<KeyPairConfig>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            discover_env: true,
            static_keys: Vec::new(),
            default_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticKeyConfig {
    pub channel: String,
    pub key_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyPairConfig {
    pub key_id: String,
    pub key: String,
}
