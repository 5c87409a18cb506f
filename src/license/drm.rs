//! Player-side DRM configuration.
//!
//! A channel declares one of four DRM kinds. Clear-key channels carry inline
//! key material; Widevine and PlayReady channels carry a license server URL,
//! which may itself be routed through this gateway's `/proxy` endpoint.
//!
//! The server never serves these; the `player-drm` command renders them for
//! channel lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::LicenseKeySet;
use crate::relay::target::encode_component;

pub const WIDEVINE_KEY_SYSTEM: &str = "com.widevine.alpha";
pub const PLAYREADY_KEY_SYSTEM: &str = "com.microsoft.playready";

/// DRM declaration of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrmConfig {
    None,
    #[serde(rename_all = "camelCase")]
    ClearKey { key_id: String, key: String },
    #[serde(rename_all = "camelCase")]
    Widevine { license_uri: String },
    #[serde(rename_all = "camelCase")]
    PlayReady { license_uri: String },
}

/// The player's `drm` configuration block.
///
/// Every field is always present so applying it replaces whatever a previous
/// channel configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDrmConfig {
    pub servers: BTreeMap<String, String>,
    pub clear_keys: BTreeMap<String, String>,
    pub advanced: BTreeMap<String, serde_json::Value>,
}

impl DrmConfig {
    /// Name of the DRM kind as it appears in channel lists.
    pub fn kind(&self) -> &'static str {
        match self {
            DrmConfig::None => "none",
            DrmConfig::ClearKey { .. } => "clearkey",
            DrmConfig::Widevine { .. } => "widevine",
            DrmConfig::PlayReady { .. } => "playready",
        }
    }

    pub fn license_uri(&self) -> Option<&str> {
        match self {
            DrmConfig::Widevine { license_uri } | DrmConfig::PlayReady { license_uri } => {
                Some(license_uri)
            }
            _ => None,
        }
    }

    pub fn player_config(&self) -> PlayerDrmConfig {
        let mut config = PlayerDrmConfig::default();
        match self {
            DrmConfig::None => {}
            DrmConfig::ClearKey { key_id, key } => {
                config.clear_keys.insert(key_id.clone(), key.clone());
            }
            DrmConfig::Widevine { license_uri } => {
                config
                    .servers
                    .insert(WIDEVINE_KEY_SYSTEM.to_string(), license_uri.clone());
            }
            DrmConfig::PlayReady { license_uri } => {
                config
                    .servers
                    .insert(PLAYREADY_KEY_SYSTEM.to_string(), license_uri.clone());
            }
        }
        config
    }

    /// Route the license server through the relay at `relay_base`.
    ///
    /// Kinds without a license server are returned unchanged.
    pub fn relayed(self, relay_base: &str) -> Self {
        match self {
            DrmConfig::Widevine { license_uri } => DrmConfig::Widevine {
                license_uri: relayed_license_uri(relay_base, &license_uri),
            },
            DrmConfig::PlayReady { license_uri } => DrmConfig::PlayReady {
                license_uri: relayed_license_uri(relay_base, &license_uri),
            },
            other => other,
        }
    }
}

impl From<&LicenseKeySet> for DrmConfig {
    fn from(set: &LicenseKeySet) -> Self {
        DrmConfig::ClearKey {
            key_id: set.key_id.clone(),
            key: set.key.clone(),
        }
    }
}

/// `{relay_base}/proxy?url={encoded license_uri}`
pub fn relayed_license_uri(relay_base: &str, license_uri: &str) -> String {
    format!(
        "{}/proxy?url={}",
        relay_base.trim_end_matches('/'),
        encode_component(license_uri)
    )
}
