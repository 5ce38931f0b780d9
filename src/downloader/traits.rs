// Fetcher trait definition

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::errors::FetchError;

/// Arguments for one download invocation
#[derive(Debug, Clone, Copy)]
pub struct DownloadInvocation<'a> {
    pub url: &'a str,
    /// yt-dlp `-f` value (`id` or `video+audio`)
    pub selector: &'a str,
    pub output_path: &'a Path,
    pub requires_muxing: bool,
    /// Container the merged output should use
    pub container: &'a str,
}

/// External tool that inspects and downloads media
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of the fetcher (for logging)
    fn name(&self) -> &'static str;

    /// Retrieve the raw info document (contains `formats`)
    async fn fetch_info(&self, url: &str) -> Result<serde_json::Value, FetchError>;

    /// Build the command for a download; the orchestrator spawns and supervises it
    fn download_command(&self, invocation: &DownloadInvocation<'_>) -> Command;

    /// Whether the tool needed for `video+audio` merges is installed
    fn merge_tool_available(&self) -> bool;
}
