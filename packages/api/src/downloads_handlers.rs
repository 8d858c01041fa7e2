// ABOUTME: HTTP request handlers for the download pipeline
// ABOUTME: Token issue, single-use redemption, history, and cached stats

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cube_store::{
    DownloadHistoryEntry, DownloadStats, Paginated, PaginationParams, StatsRange, StorageError,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

/// How long computed download stats stay cached
const STATS_CACHE_TTL: Duration = Duration::from_secs(3600);

fn stats_cache_key(range: StatsRange, user_id: &str) -> String {
    format!("stats:downloads:{}:{}", range.as_str(), user_id)
}

#[derive(Debug, Serialize)]
pub struct DownloadIssuedResponse {
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: u64,
}

/// Mint a single-use download token for a completed selection.
pub async fn issue(
    State(state): State<AppState>,
    Path(selection_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<DownloadIssuedResponse>>> {
    let selection = state.db.selections.get_selection(&selection_id).await?;
    let issued = state.tokens.issue(&selection, &user.id).await?;

    Ok(ok(DownloadIssuedResponse {
        download_url: format!("/api/v1/downloads/{}", issued.token),
        expires_in: issued.expires_in,
    }))
}

/// Redeem a download token for the selection's ZIP archive.
///
/// The token is consumed only after the archive has been assembled, so a
/// build failure leaves it redeemable. Between two concurrent redeems the
/// cache hands the binding to exactly one of them; the loser gets 410.
pub async fn redeem(
    State(state): State<AppState>,
    Path(token): Path<String>,
    user: AuthUser,
) -> ApiResult<Response> {
    let binding = state
        .tokens
        .peek(&token)
        .await?
        .ok_or(StorageError::Expired)?;

    if binding.user_id != user.id {
        return Err(StorageError::Forbidden.into());
    }

    let selection = state
        .db
        .selections
        .get_selection(&binding.selection_id)
        .await?;
    let product = state.db.catalog.get_product(&binding.product_id).await?;
    let modules = state.db.catalog.list_modules(&product.id, true).await?;

    let archive = state.archives.build(&product, &modules, &selection).await?;
    if !archive.skipped.is_empty() {
        warn!(
            "Archive for selection {} is missing {} material file(s)",
            selection.id,
            archive.skipped.len()
        );
    }

    if state.tokens.take(&token).await?.is_none() {
        return Err(StorageError::Expired.into());
    }

    // The download itself already succeeded; bookkeeping failures are logged,
    // not surfaced.
    if let Err(e) = state.db.selections.record_download(&selection.id).await {
        warn!("Failed to record download for {}: {}", selection.id, e);
    }
    if let Err(e) = state.db.catalog.increment_download_count(&product.id).await {
        warn!("Failed to bump download count for {}: {}", product.id, e);
    }
    for range in [StatsRange::Daily, StatsRange::Monthly] {
        let key = stats_cache_key(range, &user.id);
        if let Err(e) = state.cache.delete(&key).await {
            warn!("Failed to invalidate {}: {}", key, e);
        }
    }

    info!(
        "Selection {} downloaded as {} ({} bytes)",
        selection.id,
        archive.filename,
        archive.bytes.len()
    );

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", archive.filename),
        ),
    ];
    Ok((headers, archive.bytes).into_response())
}

pub async fn history(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Paginated<DownloadHistoryEntry>>>> {
    let (limit, offset) = pagination.validate();
    let (entries, total) = state
        .db
        .selections
        .download_history_paginated(&user.id, limit, offset)
        .await?;

    Ok(ok(Paginated::new(entries, &pagination, total)))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub range: &'static str,
    #[serde(flatten)]
    pub stats: DownloadStats,
}

/// Per-user download stats for the current day or month, cached for an hour.
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<StatsResponse>>> {
    let range = match query.range.as_deref() {
        None => StatsRange::Daily,
        Some(raw) => raw
            .parse::<StatsRange>()
            .map_err(|_| ApiError::validation("range must be 'daily' or 'monthly'"))?,
    };

    let key = stats_cache_key(range, &user.id);
    match state.cache.get(&key).await {
        Ok(Some(payload)) => {
            if let Ok(stats) = serde_json::from_str::<DownloadStats>(&payload) {
                return Ok(ok(StatsResponse {
                    range: range.as_str(),
                    stats,
                }));
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Stats cache read failed for {}: {}", key, e),
    }

    let stats = state.db.selections.download_stats(&user.id, range).await?;

    match serde_json::to_string(&stats) {
        Ok(payload) => {
            if let Err(e) = state.cache.set(&key, &payload, STATS_CACHE_TTL).await {
                warn!("Stats cache write failed for {}: {}", key, e);
            }
        }
        Err(e) => warn!("Stats serialization failed: {}", e),
    }

    Ok(ok(StatsResponse {
        range: range.as_str(),
        stats,
    }))
}
