//! `/pldt/{group}/{file...}` and its `/akamai` alias.

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{RelayError, Result};
use crate::relay::{self, RelayRequest};
use crate::server::AppContext;

pub fn pldt_routes() -> Router<AppContext> {
    Router::new()
        .route("/pldt/:group/*file", get(pldt_relay))
        .route("/akamai/:group/*file", get(pldt_relay))
        .route("/pldt/:group", get(missing_file))
        .route("/akamai/:group", get(missing_file))
}

/// Relay a file from the derived upstream. `get` also answers HEAD.
pub async fn pldt_relay(
    State(ctx): State<AppContext>,
    Path((group, file)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    let target = ctx.pldt.derive(&group, &file, query.as_deref())?;

    tracing::info!(group = %group, file = %file, "Relaying PLDT channel file");

    relay::relay(
        ctx.upstream.as_ref(),
        &ctx.settings,
        RelayRequest {
            method,
            target,
            headers,
            body: None,
        },
    )
    .await
}

async fn missing_file() -> RelayError {
    RelayError::validation("Missing or invalid parameters")
}
