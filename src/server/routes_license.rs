//! `/license/clearkey`: clear-key documents from the key store.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::server::AppContext;

#[derive(Debug, Deserialize)]
pub struct LicenseQuery {
    pub channel: Option<String>,
}

/// Serve the key document for `?channel=<id>`, or the default pair when no
/// channel is given.
pub async fn clearkey(
    State(ctx): State<AppContext>,
    Query(query): Query<LicenseQuery>,
) -> Result<impl IntoResponse> {
    let channel = query
        .channel
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let document = ctx.keys.document_for(channel)?;
    tracing::debug!(channel = channel.unwrap_or("default"), "Served clear-key document");

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(document)))
}
