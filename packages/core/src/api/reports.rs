//! Catalog report endpoint.
//!
//! Serves the same summary the scheduled webhook report is built from,
//! behind a short-lived in-process cache.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::store_error_response;
use crate::cache::ResponseCache;
use crate::loans::store::CatalogStore;
use crate::reports::{build_summary, CatalogSummary};

/// Shared state for the report endpoints.
#[derive(Clone)]
pub struct ReportsApiState {
    pub catalog: Arc<dyn CatalogStore + Send + Sync>,
    pub cache: Arc<Mutex<ResponseCache<CatalogSummary>>>,
}

/// `GET /reports/summary`.
///
/// The lock is held across the rebuild so concurrent cache misses do
/// not duplicate the store reads.
pub async fn summary(
    State(state): State<ReportsApiState>,
) -> Result<Json<CatalogSummary>, (StatusCode, Json<Value>)> {
    let mut cache = state.cache.lock().await;
    if let Some(cached) = cache.get() {
        return Ok(Json(cached));
    }

    let summary = build_summary(&state.catalog, Utc::now())
        .await
        .map_err(|err| store_error_response(&err))?;
    cache.set(summary.clone());
    Ok(Json(summary))
}
