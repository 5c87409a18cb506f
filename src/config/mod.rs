mod types;

pub use types::*;

use anyhow::{Context, Result};
use axum::http::{HeaderName, HeaderValue};
use std::path::Path;

use crate::policy::AllowListPolicy;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./tambayan-relay.toml",
        "~/.config/tambayan-relay/config.toml",
        "/etc/tambayan-relay/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let policy = AllowListPolicy::parse(&config.relay.allowed_hosts).map_err(anyhow::Error::msg)?;
    if policy.is_empty() {
        tracing::warn!("Allow-list is empty; every relayed request will be rejected");
    }

    if config.relay.max_attempts == 0 {
        anyhow::bail!("relay.max_attempts must be at least 1");
    }

    if config.relay.user_agent.trim().is_empty()
        || HeaderValue::from_str(&config.relay.user_agent).is_err()
    {
        anyhow::bail!("relay.user_agent must be a non-empty header value");
    }

    for (name, value) in &config.relay.upstream_headers {
        HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid upstream header name: {}", name))?;
        HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for upstream header {}", name))?;
    }

    if config.pldt.enabled {
        let template = &config.pldt.upstream_template;
        if !template.contains("{group}") || !template.contains("{file}") {
            anyhow::bail!("pldt.upstream_template must contain {{group}} and {{file}} placeholders");
        }
        let probe = template.replace("{group}", "probe").replace("{file}", "probe");
        reqwest::Url::parse(&probe)
            .with_context(|| format!("pldt.upstream_template is not a valid URL: {}", template))?;
    }

    for key in &config.license.static_keys {
        if key.channel.trim().is_empty() {
            anyhow::bail!("license.static_keys entries need a channel id");
        }
        if key.key_id.is_empty() || key.key.is_empty() {
            anyhow::bail!("Static key for channel '{}' is incomplete", key.channel);
        }
    }

    Ok(())
}
