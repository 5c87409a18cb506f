//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] against a
//! wiremock upstream, with a [`CountingUpstream`] in front of the real reqwest
//! client so tests can assert how many fetches a request caused. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use http_body_util::BodyExt;
use wiremock::MockServer;

use tambayan_relay::config::Config;
use tambayan_relay::error::Result;
use tambayan_relay::license::KeyStore;
use tambayan_relay::policy::AllowListPolicy;
use tambayan_relay::relay::target::encode_component;
use tambayan_relay::relay::upstream::{HttpUpstream, Upstream, UpstreamRequest, UpstreamResponse};
use tambayan_relay::relay::RelaySettings;
use tambayan_relay::server::{create_router, AppContext};

/// Upstream wrapper that counts fetches before delegating.
pub struct CountingUpstream {
    inner: HttpUpstream,
    calls: AtomicUsize,
}

impl CountingUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for CountingUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(request).await
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub upstream: Arc<CountingUpstream>,
}

impl TestHarness {
    /// Harness whose allow-list and PLDT template point at `mock`.
    pub fn new(mock: &MockServer) -> Self {
        Self::with_keys(mock, KeyStore::default())
    }

    pub fn with_keys(mock: &MockServer, keys: KeyStore) -> Self {
        Self::with_config(test_config(mock), keys)
    }

    pub fn with_config(config: Config, keys: KeyStore) -> Self {
        let policy = Arc::new(AllowListPolicy::new(&config.relay.allowed_hosts));
        let upstream = Arc::new(CountingUpstream {
            inner: HttpUpstream::new(&config.relay, Arc::clone(&policy))
                .expect("failed to build upstream client"),
            calls: AtomicUsize::new(0),
        });
        let settings =
            RelaySettings::with_auth_token(&config.relay, None).expect("invalid relay settings");

        let ctx = AppContext::with_parts(
            config,
            policy,
            upstream.clone() as Arc<dyn Upstream>,
            keys,
            settings,
        );

        Self { ctx, upstream }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Start an Axum server on a random port and return its address.
    pub async fn with_server(&self) -> SocketAddr {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }
}

/// Default config with the allow-list opened to the local mock and the PLDT
/// template rewritten onto it.
pub fn test_config(mock: &MockServer) -> Config {
    let mut config = Config::default();
    config.relay.allowed_hosts = vec!["127.0.0.1".to_string(), "akamaized.net".to_string()];
    config.relay.auth_token_env = None;
    config.pldt.upstream_template = format!("{}/live-{{group}}/out/u/{{file}}", mock.uri());
    config
}

/// `/proxy?url=` path for a target, encoded once.
pub fn proxy_path(target: &str) -> String {
    format!("/proxy?url={}", encode_component(target))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}
