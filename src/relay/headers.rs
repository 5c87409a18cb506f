//! Header projection between the caller, the relay and the upstream.
//!
//! Outbound requests carry an explicit allow-set of caller headers rather than
//! a blind copy. Upstream responses are copied minus hop-by-hop and
//! cross-origin headers, which the CORS layer owns.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};

/// Caller headers that may travel upstream.
const FORWARDED_REQUEST_HEADERS: [HeaderName; 4] = [
    header::RANGE,
    header::REFERER,
    header::ORIGIN,
    header::ACCEPT,
];

/// Header carrying the operator's upstream auth token.
pub static X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// Outbound header policy resolved once at startup.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    /// `User-Agent` used when the caller sends none
    pub default_user_agent: HeaderValue,
    /// Operator headers appended to every upstream request
    pub extra_headers: HeaderMap,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            default_user_agent: HeaderValue::from_static(crate::config::DEFAULT_USER_AGENT),
            extra_headers: HeaderMap::new(),
        }
    }
}

impl HeaderPolicy {
    /// Build the upstream request headers for a relayed call.
    pub fn outbound(&self, method: &Method, inbound: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();

        let user_agent = inbound
            .get(header::USER_AGENT)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| self.default_user_agent.clone());
        out.insert(header::USER_AGENT, user_agent);

        for name in &FORWARDED_REQUEST_HEADERS {
            if let Some(value) = inbound.get(name) {
                out.insert(name.clone(), value.clone());
            }
        }

        if method == Method::POST {
            let content_type = inbound
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            out.insert(header::CONTENT_TYPE, content_type);
        }

        for (name, value) in &self.extra_headers {
            out.insert(name.clone(), value.clone());
        }

        out
    }
}

/// Check if a header is a hop-by-hop header that shouldn't be relayed.
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy upstream response headers that are safe to hand back to the caller.
pub fn relay_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop_header(name)
            || name == header::SET_COOKIE
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Content types that say nothing useful about a media payload.
fn is_ambiguous_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "" | "application/octet-stream" | "binary/octet-stream" | "text/plain"
    )
}

/// Whether the upstream content type should be replaced by detection.
pub fn needs_content_type_detection(upstream: Option<&HeaderValue>) -> bool {
    match upstream.and_then(|v| v.to_str().ok()) {
        Some(value) => is_ambiguous_content_type(value),
        None => true,
    }
}

/// Determine content type from the extension of the upstream path.
pub fn content_type_from_path(path: &str) -> Option<&'static str> {
    let file = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = file.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "m3u8" | "m3u" => Some("application/vnd.apple.mpegurl"),
        "mpd" => Some("application/dash+xml"),
        "m4s" | "mp4" | "m4v" | "cmfv" | "m4i" => Some("video/mp4"),
        "m4a" | "cmfa" => Some("audio/mp4"),
        "ts" => Some("video/mp2t"),
        "aac" => Some("audio/aac"),
        "vtt" => Some("text/vtt"),
        _ => None,
    }
}

/// Determine content type from the first bytes of a payload.
pub fn sniff_content_type(chunk: &[u8]) -> Option<&'static str> {
    let text_start = chunk
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(chunk);
    let trimmed = trim_ascii_start(text_start);

    if trimmed.starts_with(b"#EXTM3U") {
        return Some("application/vnd.apple.mpegurl");
    }
    if trimmed.starts_with(b"<") {
        let head = &trimmed[..trimmed.len().min(512)];
        if head.windows(4).any(|w| w == b"<MPD") {
            return Some("application/dash+xml");
        }
    }
    if chunk.len() >= 8 {
        match &chunk[4..8] {
            b"ftyp" | b"styp" | b"moof" | b"moov" | b"sidx" | b"emsg" => return Some("video/mp4"),
            _ => {}
        }
    }
    // MPEG-TS packets are 188 bytes, each starting with the 0x47 sync byte.
    if chunk.len() >= 188 && chunk[0] == 0x47 && chunk.get(188).map_or(true, |b| *b == 0x47) {
        return Some("video/mp2t");
    }
    None
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
