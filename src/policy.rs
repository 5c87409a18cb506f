//! Upstream host allow-list.
//!
//! A host is allowed when it equals a rule or is a proper subdomain of one
//! (`x.akamaized.net` matches `akamaized.net`, `evil-akamaized.net` does not).
//! Matching is on whole DNS labels, never on raw substrings.

use reqwest::Url;
use std::net::IpAddr;

use crate::error::RelayError;

/// Ordered set of permitted upstream host suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowListPolicy {
    rules: Vec<String>,
}

impl AllowListPolicy {
    /// Build a policy from rules, normalizing each one and silently dropping
    /// entries that normalize to nothing. Use [`AllowListPolicy::parse`] when
    /// malformed rules should be reported instead.
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for rule in rules {
            if let Some(rule) = normalize_rule(rule.as_ref()) {
                if !normalized.contains(&rule) {
                    normalized.push(rule);
                }
            }
        }
        Self { rules: normalized }
    }

    /// Build a policy, rejecting rules that cannot describe a hostname.
    pub fn parse<I, S>(rules: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules: Vec<String> = rules.into_iter().map(|r| r.as_ref().to_string()).collect();
        for rule in &rules {
            let trimmed = rule.trim();
            if trimmed.parse::<IpAddr>().is_ok() {
                continue;
            }
            if trimmed
                .chars()
                .any(|c| c == '/' || c == ':' || c == '@' || c.is_whitespace())
            {
                return Err(format!(
                    "Invalid allow-list rule '{}': expected a bare hostname",
                    rule
                ));
            }
            if normalize_rule(trimmed).is_none() {
                return Err(format!("Invalid allow-list rule '{}': empty hostname", rule));
            }
        }
        Ok(Self::new(rules))
    }

    /// Normalized rules in configuration order.
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check a bare hostname against the rules.
    pub fn is_allowed(&self, host: &str) -> bool {
        let host = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim_end_matches('.')
            .to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }

        self.rules.iter().any(|rule| {
            host == *rule
                || (rule.parse::<IpAddr>().is_err()
                    && host.len() > rule.len()
                    && host.ends_with(rule.as_str())
                    && host.as_bytes()[host.len() - rule.len() - 1] == b'.')
        })
    }

    /// Validate a parsed target URL, returning the policy error when its host
    /// is missing or not allowed.
    pub fn check(&self, url: &Url) -> Result<(), RelayError> {
        let host = url.host_str().unwrap_or_default();
        if self.is_allowed(host) {
            Ok(())
        } else {
            Err(RelayError::DomainNotAllowed {
                host: host.to_string(),
            })
        }
    }
}

/// Lowercase, trim, and strip wildcard/leading and trailing dots.
fn normalize_rule(rule: &str) -> Option<String> {
    let rule = rule.trim().to_ascii_lowercase();
    let rule = rule
        .strip_prefix("*.")
        .or_else(|| rule.strip_prefix('.'))
        .unwrap_or(&rule)
        .trim_end_matches('.');

    if rule.is_empty() {
        None
    } else {
        Some(rule.to_string())
    }
}
