//! Clear-key license material.
//!
//! Keys are collected once at startup into an immutable [`KeyStore`] and
//! served as W3C clear-key JSON documents.

pub mod drm;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::LicenseConfig;
use crate::error::{RelayError, Result};

/// Environment variable suffix holding a channel's key id.
const KEY_ID_SUFFIX: &str = "_KEY_ID";
/// Environment variable suffix holding a channel's key.
const KEY_SUFFIX: &str = "_KEY";
/// Prefix of the variables holding the default (channel-less) pair.
const DEFAULT_KEY_PREFIX: &str = "CLEARKEY";

/// A key id / key pair, both hex strings.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseKeySet {
    pub key_id: String,
    pub key: String,
}

impl LicenseKeySet {
    pub fn new(key_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key: key.into(),
        }
    }

    /// Document for a single channel.
    pub fn document(&self) -> ClearKeyDocument {
        ClearKeyDocument {
            keys: vec![ClearKey::oct(self)],
            session_type: None,
        }
    }
}

// Key material stays out of logs.
impl fmt::Debug for LicenseKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseKeySet")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Clear-key license response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearKeyDocument {
    pub keys: Vec<ClearKey>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<String>,
}

/// One JSON Web Key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearKey {
    pub kty: String,
    pub kid: String,
    pub k: String,
}

impl ClearKey {
    fn oct(set: &LicenseKeySet) -> Self {
        Self {
            kty: "oct".to_string(),
            kid: set.key_id.clone(),
            k: set.key.clone(),
        }
    }
}

/// Immutable channel → key mapping plus an optional default pair.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    channels: HashMap<String, LicenseKeySet>,
    default_key: Option<LicenseKeySet>,
}

impl KeyStore {
    /// Build the store from config and the current process environment.
    pub fn from_process_env(config: &LicenseConfig) -> Self {
        Self::from_env_vars(config, std::env::vars())
    }

    /// Build the store from config and an explicit set of environment
    /// variables.
    ///
    /// Sources in increasing precedence: discovered `<X>_KEY_ID`/`<X>_KEY`
    /// pairs, static keys from the config file, declared channels read from
    /// the environment. The default pair comes from `CLEARKEY_KEY_ID` /
    /// `CLEARKEY_KEY`, else from `default_key` in the config.
    pub fn from_env_vars<I>(config: &LicenseConfig, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        let mut channels = HashMap::new();

        if config.discover_env {
            for (name, key_id) in &env {
                let Some(prefix) = name.strip_suffix(KEY_ID_SUFFIX) else {
                    continue;
                };
                if prefix.is_empty() || prefix == DEFAULT_KEY_PREFIX {
                    continue;
                }
                let Some(key) = env.get(&format!("{}{}", prefix, KEY_SUFFIX)) else {
                    continue;
                };
                // Discovery only picks up values shaped like key material.
                if is_hex(key_id) && is_hex(key) {
                    channels.insert(normalize_channel(prefix), LicenseKeySet::new(key_id, key));
                }
            }
        }

        for entry in &config.static_keys {
            channels.insert(
                normalize_channel(&entry.channel),
                LicenseKeySet::new(&entry.key_id, &entry.key),
            );
        }

        for channel in &config.channels {
            match lookup_pair(&env, &channel_env_prefix(channel)) {
                Some(set) => {
                    channels.insert(normalize_channel(channel), set);
                }
                None => {
                    tracing::warn!(
                        channel = %channel,
                        "No {}_KEY_ID/{}_KEY pair in the environment",
                        channel_env_prefix(channel),
                        channel_env_prefix(channel)
                    );
                }
            }
        }

        let default_key = lookup_pair(&env, DEFAULT_KEY_PREFIX).or_else(|| {
            config
                .default_key
                .as_ref()
                .map(|pair| LicenseKeySet::new(&pair.key_id, &pair.key))
        });

        tracing::info!(
            channels = channels.len(),
            default_key = default_key.is_some(),
            "Clear-key store loaded"
        );

        Self {
            channels,
            default_key,
        }
    }

    /// Build a store from known pairs.
    pub fn with_keys<I, S>(keys: I, default_key: Option<LicenseKeySet>) -> Self
    where
        I: IntoIterator<Item = (S, LicenseKeySet)>,
        S: AsRef<str>,
    {
        Self {
            channels: keys
                .into_iter()
                .map(|(channel, set)| (normalize_channel(channel.as_ref()), set))
                .collect(),
            default_key,
        }
    }

    /// Key pair for a channel, matched case-insensitively and with `-`, ` `
    /// and `_` treated alike.
    pub fn lookup(&self, channel: &str) -> Option<&LicenseKeySet> {
        self.channels.get(&normalize_channel(channel))
    }

    pub fn default_key(&self) -> Option<&LicenseKeySet> {
        self.default_key.as_ref()
    }

    /// Known channel ids, sorted.
    pub fn channels(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve the document served for an optional channel.
    ///
    /// An unknown channel never falls back to the default pair.
    pub fn document_for(&self, channel: Option<&str>) -> Result<ClearKeyDocument> {
        match channel {
            Some(id) => self
                .lookup(id)
                .map(LicenseKeySet::document)
                .ok_or_else(|| RelayError::not_found("channel", id)),
            None => {
                let set = self
                    .default_key
                    .as_ref()
                    .ok_or_else(|| RelayError::not_found("default key", "clearkey"))?;
                let mut document = set.document();
                document.session_type = Some("temporary".to_string());
                Ok(document)
            }
        }
    }
}

/// Environment variable prefix for a channel id: upper-cased, with anything
/// that is not ASCII alphanumeric replaced by `_`.
pub fn channel_env_prefix(channel: &str) -> String {
    channel
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Store key for a channel id. Ids that share an environment prefix
/// (`one-sports`, `One Sports`, `ONE_SPORTS`) are the same channel.
fn normalize_channel(channel: &str) -> String {
    channel_env_prefix(channel).to_ascii_lowercase()
}

fn lookup_pair(env: &HashMap<String, String>, prefix: &str) -> Option<LicenseKeySet> {
    let key_id = env.get(&format!("{}{}", prefix, KEY_ID_SUFFIX))?;
    let key = env.get(&format!("{}{}", prefix, KEY_SUFFIX))?;
    Some(LicenseKeySet::new(key_id, key))
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}
