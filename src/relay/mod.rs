//! Streaming relay core.
//!
//! [`relay`] takes a validated target, projects the caller's headers, fetches
//! the upstream and hands its status, filtered headers and body straight back
//! to the caller without buffering.

pub mod body;
pub mod headers;
pub mod target;
pub mod upstream;

use anyhow::Context;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use futures::StreamExt;
use reqwest::Url;

use crate::config::RelayConfig;
use crate::error::Result;
use body::{ByteStream, RelayBody};
use headers::HeaderPolicy;
use upstream::{Upstream, UpstreamRequest};

/// Per-process relay behaviour resolved from configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub headers: HeaderPolicy,
    /// Replace missing or ambiguous upstream content types
    pub sniff_content_type: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            headers: HeaderPolicy::default(),
            sniff_content_type: true,
        }
    }
}

impl RelaySettings {
    /// Build settings from config, reading the auth token variable once.
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let token = config
            .auth_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self::with_auth_token(config, token)
    }

    /// Build settings from config with an explicit auth token.
    pub fn with_auth_token(config: &RelayConfig, token: Option<String>) -> anyhow::Result<Self> {
        let default_user_agent = HeaderValue::from_str(&config.user_agent)
            .with_context(|| format!("Invalid user agent: {}", config.user_agent))?;

        let mut extra_headers = HeaderMap::new();
        for (name, value) in &config.upstream_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid upstream header name: {}", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for upstream header {}", name))?;
            extra_headers.insert(name, value);
        }

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value =
                HeaderValue::from_str(&token).context("Auth token is not a valid header value")?;
            value.set_sensitive(true);
            extra_headers.insert(headers::X_AUTH_TOKEN.clone(), value);
            tracing::debug!("Upstream auth token configured");
        }

        Ok(Self {
            headers: HeaderPolicy {
                default_user_agent,
                extra_headers,
            },
            sniff_content_type: config.sniff_content_type,
        })
    }
}

/// A validated call to relay.
pub struct RelayRequest {
    pub method: Method,
    pub target: Url,
    /// Caller headers; only the forwarded set leaves the gateway
    pub headers: HeaderMap,
    /// Caller body, POST only
    pub body: Option<ByteStream>,
}

/// Relay one request to its upstream and build the caller's response.
///
/// The upstream status is mirrored whatever it is. Only a failure to obtain
/// an upstream response at all becomes an error.
pub async fn relay(
    upstream: &dyn Upstream,
    settings: &RelaySettings,
    request: RelayRequest,
) -> Result<Response> {
    let RelayRequest {
        method,
        target,
        headers: inbound,
        body,
    } = request;

    let outbound = settings.headers.outbound(&method, &inbound);
    let body = if method == Method::POST { body } else { None };

    tracing::debug!(method = %method, target_url = %target, "Relaying request");

    let response = upstream
        .fetch(UpstreamRequest {
            method: method.clone(),
            url: target.clone(),
            headers: outbound,
            body,
        })
        .await?;

    let status = response.status;
    let mut response_headers = headers::relay_response_headers(&response.headers);
    let mut upstream_body = response.body;

    // Error bodies keep whatever type the upstream gave them.
    if settings.sniff_content_type
        && status.is_success()
        && method != Method::POST
        && headers::needs_content_type_detection(response.headers.get(header::CONTENT_TYPE))
    {
        let mut detected = headers::content_type_from_path(target.path());

        if detected.is_none() && method == Method::GET {
            let first = upstream_body.next().await;
            if let Some(Ok(chunk)) = &first {
                detected = headers::sniff_content_type(chunk);
            }
            upstream_body = body::prepend(first, upstream_body);
        }

        match detected {
            Some(content_type) => {
                response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            None if !response_headers.contains_key(header::CONTENT_TYPE) => {
                response_headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
            }
            None => {}
        }
    }

    tracing::debug!(target_url = %target, status = %status, "Upstream headers relayed");

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(RelayBody::new(upstream_body, target.as_str()))
    };

    let mut out = Response::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = response_headers;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::relay::upstream::UpstreamResponse;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use std::sync::Mutex;

    /// Canned upstream that records what it was asked for.
    struct FakeUpstream {
        status: StatusCode,
        headers: HeaderMap,
        chunks: Vec<&'static str>,
        seen: Mutex<Vec<(Method, String, HeaderMap, Vec<u8>)>>,
    }

    impl FakeUpstream {
        fn new(
            status: StatusCode,
            headers: &[(&'static str, &'static str)],
            chunks: &[&'static str],
        ) -> Self {
            let mut map = HeaderMap::new();
            for (name, value) in headers {
                map.insert(*name, HeaderValue::from_static(*value));
            }
            Self {
                status,
                headers: map,
                chunks: chunks.to_vec(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
            let mut sent = Vec::new();
            if let Some(mut body) = request.body {
                while let Some(chunk) = body.next().await {
                    sent.extend_from_slice(&chunk.map_err(RelayError::upstream)?);
                }
            }
            self.seen.lock().unwrap().push((
                request.method,
                request.url.to_string(),
                request.headers,
                sent,
            ));
            let items: Vec<std::io::Result<Bytes>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            Ok(UpstreamResponse {
                status: self.status,
                headers: self.headers.clone(),
                body: futures::stream::iter(items).boxed(),
            })
        }
    }

    fn get(target: &str) -> RelayRequest {
        RelayRequest {
            method: Method::GET,
            target: Url::parse(target).unwrap(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    async fn read_body(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_body_and_status_relayed() {
        let upstream = FakeUpstream::new(
            StatusCode::OK,
            &[("content-type", "video/mp4"), ("content-length", "6")],
            &["abc", "def"],
        );
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/seg.m4s"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "6");
        assert_eq!(read_body(response).await, b"abcdef");
    }

    #[tokio::test]
    async fn test_upstream_error_status_mirrored() {
        let upstream = FakeUpstream::new(StatusCode::NOT_FOUND, &[], &["gone"]);
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/a.mpd"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_body(response).await, b"gone");
    }

    #[tokio::test]
    async fn test_error_body_is_not_relabelled() {
        let upstream = FakeUpstream::new(
            StatusCode::NOT_FOUND,
            &[("content-type", "text/plain")],
            &["Not Found"],
        );
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/a.mpd"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let upstream = FakeUpstream::new(StatusCode::BAD_GATEWAY, &[], &["#EXTM3U\n"]);
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/live"))
            .await
            .unwrap();
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_content_type_from_extension() {
        let upstream = FakeUpstream::new(
            StatusCode::OK,
            &[("content-type", "application/octet-stream")],
            &["<MPD/>"],
        );
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/out/manifest.mpd"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/dash+xml");
    }

    #[tokio::test]
    async fn test_content_type_sniffed_without_losing_bytes() {
        let upstream = FakeUpstream::new(
            StatusCode::OK,
            &[("content-type", "text/plain")],
            &["#EXTM3U\n", "#EXT-X-VERSION:3\n"],
        );
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/live/playlist"))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(read_body(response).await, b"#EXTM3U\n#EXT-X-VERSION:3\n");
    }

    #[tokio::test]
    async fn test_undetectable_keeps_upstream_type() {
        let upstream = FakeUpstream::new(StatusCode::OK, &[("content-type", "text/plain")], &["hello"]);
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/readme"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let upstream = FakeUpstream::new(StatusCode::OK, &[], &["hello"]);
        let response = relay(&upstream, &RelaySettings::default(), get("https://x.akamaized.net/readme"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn test_sniffing_disabled() {
        let upstream = FakeUpstream::new(StatusCode::OK, &[("content-type", "text/plain")], &["#EXTM3U\n"]);
        let settings = RelaySettings {
            sniff_content_type: false,
            ..RelaySettings::default()
        };
        let response = relay(&upstream, &settings, get("https://x.akamaized.net/a.m3u8"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let upstream = FakeUpstream::new(
            StatusCode::OK,
            &[("content-type", "video/mp2t"), ("content-length", "1880")],
            &["should not be read"],
        );
        let mut request = get("https://x.akamaized.net/seg.ts");
        request.method = Method::HEAD;
        let response = relay(&upstream, &RelaySettings::default(), request).await.unwrap();

        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1880");
        assert!(read_body(response).await.is_empty());
        assert_eq!(upstream.seen.lock().unwrap()[0].0, Method::HEAD);
    }

    #[tokio::test]
    async fn test_post_body_forwarded_and_not_sniffed() {
        let upstream = FakeUpstream::new(
            StatusCode::OK,
            &[("content-type", "application/octet-stream")],
            &["license"],
        );
        let challenge: ByteStream =
            futures::stream::iter(vec![Ok(Bytes::from_static(b"chal")), Ok(Bytes::from_static(b"lenge"))]).boxed();
        let request = RelayRequest {
            method: Method::POST,
            target: Url::parse("https://x.akamaized.net/license.m3u8").unwrap(),
            headers: HeaderMap::new(),
            body: Some(challenge),
        };
        let response = relay(&upstream, &RelaySettings::default(), request).await.unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen[0].3, b"challenge");
        assert_eq!(seen[0].2[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn test_get_body_dropped() {
        let upstream = FakeUpstream::new(StatusCode::OK, &[], &[]);
        let mut request = get("https://x.akamaized.net/a.mpd");
        request.body = Some(futures::stream::iter(vec![Ok(Bytes::from_static(b"x"))]).boxed());
        relay(&upstream, &RelaySettings::default(), request).await.unwrap();
        assert!(upstream.seen.lock().unwrap()[0].3.is_empty());
    }

    #[test]
    fn test_settings_with_auth_token() {
        let settings = RelaySettings::with_auth_token(&RelayConfig::default(), Some("s3cret".into())).unwrap();
        let out = settings.headers.outbound(&Method::GET, &HeaderMap::new());
        assert_eq!(out[&headers::X_AUTH_TOKEN], "s3cret");

        let settings = RelaySettings::with_auth_token(&RelayConfig::default(), Some(String::new())).unwrap();
        assert!(settings.headers.extra_headers.is_empty());
    }

    #[test]
    fn test_settings_with_upstream_headers() {
        let mut config = RelayConfig::default();
        config.user_agent = "Player/2".to_string();
        config
            .upstream_headers
            .insert("x-tenant".to_string(), "tambayan".to_string());
        let settings = RelaySettings::with_auth_token(&config, None).unwrap();
        let out = settings.headers.outbound(&Method::GET, &HeaderMap::new());
        assert_eq!(out[header::USER_AGENT], "Player/2");
        assert_eq!(out["x-tenant"], "tambayan");
    }
}
