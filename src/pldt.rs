//! Derived upstream for PLDT/Akamai live channels.
//!
//! `/pldt/{group}/{file...}` maps onto a fixed operator template instead of a
//! caller-supplied URL, so the allow-list is not consulted.

use reqwest::Url;

use crate::error::{RelayError, Result};

const INVALID_PARAMS: &str = "Missing or invalid parameters";

/// Upstream URL template with `{group}` and `{file}` placeholders.
#[derive(Debug, Clone)]
pub struct PldtTemplate {
    template: String,
}

impl PldtTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Build the upstream URL for a channel group and file path. The caller's
    /// query string, if any, is appended.
    pub fn derive(&self, group: &str, file: &str, query: Option<&str>) -> Result<Url> {
        let file = file.strip_prefix('/').unwrap_or(file);
        if !is_valid_group(group) || !is_valid_file(file) {
            return Err(RelayError::validation(INVALID_PARAMS));
        }

        let raw = self
            .template
            .replace("{group}", group)
            .replace("{file}", file);
        let mut url = Url::parse(&raw).map_err(|e| {
            tracing::warn!(template = %self.template, error = %e, "Derived upstream URL does not parse");
            RelayError::validation(INVALID_PARAMS)
        })?;

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
                _ => query.to_string(),
            };
            url.set_query(Some(&merged));
        }

        Ok(url)
    }
}

/// Channel groups are plain `[A-Za-z0-9-]+` labels.
fn is_valid_group(group: &str) -> bool {
    !group.is_empty()
        && group
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// At least one segment, none empty or a dot segment, and nothing that would
/// escape the path component.
fn is_valid_file(file: &str) -> bool {
    !file.is_empty()
        && file
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
        && !file
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '?' | '#' | '\\' | '%'))
}
