use crate::config::Config;
use crate::license::KeyStore;
use crate::pldt::PldtTemplate;
use crate::policy::AllowListPolicy;
use crate::relay::upstream::{HttpUpstream, Upstream};
use crate::relay::RelaySettings;
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod cors;
pub mod request_id;
pub mod routes_license;
pub mod routes_pldt;
pub mod routes_proxy;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Hosts `/proxy` may reach
    pub policy: Arc<AllowListPolicy>,
    /// Clear-key material, loaded once
    pub keys: Arc<KeyStore>,
    /// Upstream fetcher (reqwest in production)
    pub upstream: Arc<dyn Upstream>,
    pub settings: Arc<RelaySettings>,
    pub pldt: Arc<PldtTemplate>,
}

impl AppContext {
    /// Build the production context: reqwest upstream, keys and auth token
    /// from the process environment.
    pub fn from_config(config: Config) -> Result<Self> {
        let policy = Arc::new(
            AllowListPolicy::parse(&config.relay.allowed_hosts).map_err(anyhow::Error::msg)?,
        );
        let upstream = HttpUpstream::new(&config.relay, Arc::clone(&policy))
            .context("Failed to create upstream client")?;
        let keys = KeyStore::from_process_env(&config.license);
        let settings = RelaySettings::from_config(&config.relay)?;

        Ok(Self::with_parts(config, policy, Arc::new(upstream), keys, settings))
    }

    /// Assemble a context from already built parts.
    pub fn with_parts(
        config: Config,
        policy: Arc<AllowListPolicy>,
        upstream: Arc<dyn Upstream>,
        keys: KeyStore,
        settings: RelaySettings,
    ) -> Self {
        let pldt = PldtTemplate::new(config.pldt.upstream_template.clone());
        Self {
            config: Arc::new(config),
            policy,
            keys: Arc::new(keys),
            upstream,
            settings: Arc::new(settings),
            pldt: Arc::new(pldt),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let routes = relay_routes(&ctx);

    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        .merge(routes.clone());

    // Older player builds call everything under /api
    if ctx.config.server.api_prefix {
        app = app.nest("/api", routes);
    }

    app.layer(middleware::from_fn(cors::cors_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn relay_routes(ctx: &AppContext) -> Router<AppContext> {
    let mut routes = Router::new()
        .route("/proxy", any(routes_proxy::proxy))
        .route("/license/clearkey", get(routes_license::clearkey));

    if ctx.config.pldt.enabled {
        routes = routes.merge(routes_pldt::pldt_routes());
    }

    routes
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::from_config(config)?;

    tracing::info!(
        allowed_hosts = ?ctx.policy.rules(),
        "Starting server on {}",
        addr
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve(listener, ctx, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
