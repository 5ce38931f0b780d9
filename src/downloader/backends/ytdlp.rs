// yt-dlp fetcher - the only production Fetcher
//
// Info: `yt-dlp --dump-json` under a deadline.
// Download: a prepared command that the orchestrator spawns and supervises.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ServerConfig;
use crate::downloader::errors::FetchError;
use crate::downloader::tools::{ToolInfo, ToolManager, ToolType};
use crate::downloader::traits::{DownloadInvocation, Fetcher};
use crate::downloader::utils::run_output_with_timeout;

/// CLI-based fetcher using the yt-dlp binary
pub struct YtDlpFetcher {
    ytdlp: ToolInfo,
    ffmpeg: ToolInfo,
    proxy: Option<String>,
    info_timeout: Duration,
}

impl YtDlpFetcher {
    pub fn from_config(config: &ServerConfig) -> Self {
        let manager = ToolManager::new();
        let ytdlp = manager.get_tool_info(ToolType::YtDlp, config.fetcher_path.as_deref());
        let ffmpeg = manager.get_tool_info(ToolType::Ffmpeg, None);

        tracing::info!(
            ytdlp_path = ?ytdlp.path,
            ytdlp_version = ?ytdlp.version,
            ffmpeg_available = ffmpeg.is_available,
            "fetcher tools detected"
        );
        if !ytdlp.is_available {
            tracing::warn!("yt-dlp not found; info and download requests will fail");
        }

        Self {
            ytdlp,
            ffmpeg,
            proxy: config.proxy.clone(),
            info_timeout: config.info_timeout,
        }
    }

    fn program(&self) -> &str {
        self.ytdlp.path.as_deref().unwrap_or("yt-dlp")
    }

    /// Build info command arguments
    fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
        ];

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Build download command arguments
    fn download_args(&self, invocation: &DownloadInvocation<'_>) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            invocation.selector.to_string(),
            "-o".to_string(),
            invocation.output_path.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-part".to_string(),
            "--socket-timeout".to_string(),
            "30".to_string(),
        ];

        if invocation.requires_muxing {
            args.push("--merge-output-format".to_string());
            args.push(invocation.container.to_string());
            if let Some(ffmpeg) = &self.ffmpeg.path {
                args.push("--ffmpeg-location".to_string());
                args.push(ffmpeg.clone());
            }
        }

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push("--".to_string());
        args.push(invocation.url.to_string());
        args
    }

    fn parse_json(stdout: &[u8]) -> Result<serde_json::Value, FetchError> {
        let json_str = String::from_utf8_lossy(stdout);
        serde_json::from_str(&json_str)
            .map_err(|e| FetchError::ParseError(format!("Invalid JSON: {}", e)))
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_info(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let mut command = Command::new(self.program());
        command.args(self.info_args(url));
        tracing::debug!(program = self.program(), url, "fetching info");

        let output = run_output_with_timeout(command, self.info_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(FetchError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        Self::parse_json(&output.stdout)
    }

    fn download_command(&self, invocation: &DownloadInvocation<'_>) -> Command {
        let mut command = Command::new(self.program());
        command
            .args(self.download_args(invocation))
            .stdin(Stdio::null());
        command
    }

    fn merge_tool_available(&self) -> bool {
        self.ffmpeg.is_available
    }
}
