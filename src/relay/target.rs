//! Target URL resolution.
//!
//! The `url` query parameter is read from the raw query string and
//! percent-decoded exactly once, so a nested proxied URL keeps its own
//! encoding and literal `+` characters survive.

use reqwest::Url;

use crate::error::{RelayError, Result};
use crate::policy::AllowListPolicy;

/// Query parameter naming the upstream target.
pub const TARGET_PARAM: &str = "url";

/// Resolve and validate the relay target from a raw query string.
///
/// Every check completes before the caller is allowed to touch the network:
/// presence, decoding, URL syntax, scheme, then the allow-list.
pub fn resolve_target(raw_query: Option<&str>, policy: &AllowListPolicy) -> Result<Url> {
    let raw = raw_query
        .and_then(|q| query_param(q, TARGET_PARAM))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::validation("Missing URL"))?;

    let decoded = percent_decode(raw).ok_or_else(|| RelayError::validation("Invalid URL encoding"))?;

    let url = parse_target(&decoded)?;
    policy.check(&url)?;
    Ok(url)
}

/// Parse a decoded target as an absolute http(s) URL with a host.
pub fn parse_target(decoded: &str) -> Result<Url> {
    let url = Url::parse(decoded.trim()).map_err(|_| RelayError::validation("Invalid URL"))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(RelayError::validation("Unsupported URL scheme")),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(RelayError::validation("Invalid URL"));
    }

    Ok(url)
}

/// Find the raw (still encoded) value of a query parameter.
pub fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

/// Decode `%XX` escapes once. Returns `None` for truncated or non-hex escapes
/// and for byte sequences that are not UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_value)?;
            let lo = bytes.get(i + 2).copied().and_then(hex_value)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

/// Percent-encode a value for use as a query component.
pub fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
