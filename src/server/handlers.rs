// Request handlers

use std::future::Future;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::ApiError;
use super::AppState;
use crate::downloader::utils::output_file_name;
use crate::downloader::{parse_catalog, DownloadResult, FormatSelector};

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub output_path: String,
    pub download_url: String,
    #[serde(rename = "estimatedSizeMB")]
    pub estimated_size_mb: f64,
    pub format_selector: String,
    pub requires_muxing: bool,
}

/// Malformed bodies count as a missing url
fn require_url(payload: Result<Json<UrlRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Ok(Json(request)) = payload else {
        return Err(ApiError::missing_url());
    };

    request
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(ApiError::missing_url)
}

/// Whole-request deadline; dropping the future kills any running fetcher
async fn with_deadline<T>(
    deadline: Duration,
    work: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_secs = deadline.as_secs(), "request deadline reached");
            Err(ApiError::request_timeout(deadline))
        }
    }
}

pub async fn liveness(State(state): State<AppState>) -> Json<serde_json::Value> {
    let fetcher = state.downloader.fetcher();
    Json(serde_json::json!({
        "status": "ok",
        "fetcher": fetcher.name(),
        "mergeToolAvailable": fetcher.merge_tool_available(),
    }))
}

pub async fn info(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = require_url(payload)?;

    with_deadline(state.config.request_timeout, async {
        let doc = state
            .downloader
            .fetcher()
            .fetch_info(&url)
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "info call failed");
                ApiError::info_unavailable(e)
            })?;
        Ok(Json(doc))
    })
    .await
}

pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let url = require_url(payload)?;
    with_deadline(state.config.request_timeout, run_download(&state, &url)).await
}

async fn run_download(state: &AppState, url: &str) -> Result<Json<DownloadResponse>, ApiError> {
    let config = &state.config;

    let doc = state
        .downloader
        .fetcher()
        .fetch_info(url)
        .await
        .map_err(|e| {
            tracing::warn!(url, error = %e, "info call failed");
            ApiError::info_unavailable(e)
        })?;

    let catalog = parse_catalog(&doc);
    let plan = FormatSelector::select(&catalog, &config.allowed_extensions, config.max_size_bytes)
        .map_err(|e| {
            tracing::info!(url, formats = catalog.len(), error = %e, "no plan");
            ApiError::from(e)
        })?;

    tracing::info!(
        url,
        selector = %plan.selector,
        kind = ?plan.kind,
        estimated_bytes = plan.estimated_size_bytes,
        "plan selected"
    );

    let file_name = output_file_name(url, &plan.container, OffsetDateTime::now_utc());
    let output_path = config.output_dir.join(&file_name);

    match state
        .downloader
        .execute(&plan, url, &output_path, config.download_timeout)
        .await
    {
        DownloadResult::Succeeded { output_path, plan } => Ok(Json(DownloadResponse {
            output_path: output_path.to_string_lossy().to_string(),
            download_url: format!("/downloads/{}", file_name),
            estimated_size_mb: plan.estimated_size_mb(),
            format_selector: plan.selector.clone(),
            requires_muxing: plan.requires_muxing(),
        })),
        DownloadResult::Failed { reason, diagnostic } => {
            Err(ApiError::fetcher_failed(reason, diagnostic))
        }
        DownloadResult::TimedOut { after } => Err(ApiError::download_timeout(after)),
    }
}
