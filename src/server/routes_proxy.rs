//! `/proxy?url=<encoded>`: the allow-listed streaming relay.

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{HeaderMap, Method},
    response::Response,
};

use crate::error::{RelayError, Result};
use crate::relay::{self, body, target, RelayRequest};
use crate::server::AppContext;

/// Relay GET, HEAD and POST to an allow-listed target.
///
/// Everything about the target is validated before the upstream is touched.
/// OPTIONS never gets here; the CORS layer answers it.
pub async fn proxy(
    State(ctx): State<AppContext>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    request_body: Body,
) -> Result<Response> {
    if !matches!(method, Method::GET | Method::HEAD | Method::POST) {
        return Err(RelayError::validation("Missing or invalid URL or method"));
    }

    let target = target::resolve_target(query.as_deref(), &ctx.policy)?;
    let body = (method == Method::POST).then(|| body::from_axum_body(request_body));

    tracing::info!(method = %method, host = target.host_str().unwrap_or_default(), "Proxying");

    relay::relay(
        ctx.upstream.as_ref(),
        &ctx.settings,
        RelayRequest {
            method,
            target,
            headers,
            body,
        },
    )
    .await
}
