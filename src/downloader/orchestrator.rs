// Download orchestration - runs a plan through the fetcher
//
// Exactly one DownloadResult per call. Process exit and the deadline race
// in a single `select!`; whichever completes first decides the outcome and
// the other branch is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::time::Instant;

use super::diagnostics::Diagnostic;
use super::models::{DownloadPlan, DownloadResult, FailureReason};
use super::traits::{DownloadInvocation, Fetcher};
use super::utils::{isolate_process_group, join_until, ProcessGroup};

/// Stderr kept in memory per download
const MAX_STDERR_BYTES: usize = 64 * 1024;

enum Completion {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
}

pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Run `plan` for `source_url`, writing to `output_path`, within `timeout`
    pub async fn execute(
        &self,
        plan: &DownloadPlan,
        source_url: &str,
        output_path: &Path,
        timeout: Duration,
    ) -> DownloadResult {
        if plan.requires_muxing() && !self.fetcher.merge_tool_available() {
            tracing::warn!(selector = %plan.selector, "merge requested but ffmpeg is missing");
            return DownloadResult::Failed {
                reason: FailureReason::FetcherUnavailable,
                diagnostic: Diagnostic::merge_tool_missing(format!(
                    "selector {} needs ffmpeg to merge video and audio",
                    plan.selector
                )),
            };
        }

        let invocation = DownloadInvocation {
            url: source_url,
            selector: &plan.selector,
            output_path,
            requires_muxing: plan.requires_muxing(),
            container: &plan.container,
        };

        let mut command = self.fetcher.download_command(&invocation);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut command);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(fetcher = self.fetcher.name(), error = %e, "failed to start fetcher");
                return DownloadResult::Failed {
                    reason: FailureReason::FetcherUnavailable,
                    diagnostic: Diagnostic::executable_missing(format!(
                        "failed to start {}: {}",
                        self.fetcher.name(),
                        e
                    )),
                };
            }
        };

        // Dropping this (request cancelled) takes down ffmpeg and friends too
        let mut group = ProcessGroup::of(&child);
        tracing::info!(
            pid = ?child.id(),
            selector = %plan.selector,
            path = %output_path.display(),
            "download started"
        );
        let started = Instant::now();
        let deadline = started + timeout;

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("[download]") || line.contains("[Merger]") {
                        tracing::debug!(target: "fetcher", "{}", line);
                    }
                }
            })
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut stderr = stderr;
                let mut kept: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 4096];
                // Keep draining so the child never blocks on a full pipe
                while let Ok(n) = stderr.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    kept.extend_from_slice(&chunk[..n]);
                    if kept.len() > MAX_STDERR_BYTES {
                        let excess = kept.len() - MAX_STDERR_BYTES;
                        kept.drain(..excess);
                    }
                }
                String::from_utf8_lossy(&kept).to_string()
            })
        });

        let completion = tokio::select! {
            status = child.wait() => Completion::Exited(status),
            _ = tokio::time::sleep_until(deadline) => Completion::Deadline,
        };

        match completion {
            Completion::Deadline => {
                group.kill();
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "failed to kill timed out fetcher");
                }
                if let Some(task) = stdout_task {
                    task.abort();
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                tracing::warn!(
                    selector = %plan.selector,
                    timeout_secs = timeout.as_secs(),
                    "download timed out, fetcher killed"
                );
                DownloadResult::TimedOut { after: timeout }
            }
            Completion::Exited(status) => {
                // Helpers outliving the fetcher would keep the pipes open
                group.kill();
                if let Some(task) = stdout_task {
                    join_until(deadline, task).await;
                }
                let stderr = match stderr_task {
                    Some(task) => join_until(deadline, task).await.unwrap_or_default(),
                    None => String::new(),
                };
                let elapsed_ms = started.elapsed().as_millis() as u64;

                match status {
                    Ok(status) if status.success() => {
                        tracing::info!(selector = %plan.selector, elapsed_ms, "download finished");
                        DownloadResult::Succeeded {
                            output_path: PathBuf::from(output_path),
                            plan: plan.clone(),
                        }
                    }
                    Ok(status) => {
                        let diagnostic = Diagnostic::from_stderr(&stderr);
                        tracing::warn!(
                            code = ?status.code(),
                            kind = ?diagnostic.kind,
                            elapsed_ms,
                            "fetcher exited nonzero"
                        );
                        DownloadResult::Failed {
                            reason: FailureReason::NonZeroExit {
                                code: status.code(),
                            },
                            diagnostic,
                        }
                    }
                    Err(e) => DownloadResult::Failed {
                        reason: FailureReason::FetcherUnavailable,
                        diagnostic: Diagnostic::from_stderr(&format!(
                            "failed to wait for fetcher: {}\n{}",
                            e, stderr
                        )),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::diagnostics::DiagnosticKind;
    use crate::downloader::errors::FetchError;
    use crate::downloader::models::{FormatDescriptor, PlanKind};
    use crate::downloader::utils::test_support::still_running;
    use async_trait::async_trait;
    use tokio::process::Command;

    /// Fetcher whose download is an arbitrary `sh -c` script.
    /// `$1` is the output path.
    struct ScriptFetcher {
        script: String,
        merge_tool: bool,
        program: &'static str,
    }

    impl ScriptFetcher {
        fn new(script: &str) -> Self {
            Self {
                script: script.to_string(),
                merge_tool: true,
                program: "sh",
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptFetcher {
        fn name(&self) -> &'static str {
            "script"
        }

        async fn fetch_info(&self, _url: &str) -> Result<serde_json::Value, FetchError> {
            Ok(serde_json::json!({ "formats": [] }))
        }

        fn download_command(&self, invocation: &DownloadInvocation<'_>) -> Command {
            let mut cmd = Command::new(self.program);
            cmd.arg("-c")
                .arg(&self.script)
                .arg("sh")
                .arg(invocation.output_path);
            cmd
        }

        fn merge_tool_available(&self) -> bool {
            self.merge_tool
        }
    }

    fn combined_plan() -> DownloadPlan {
        let f = FormatDescriptor {
            id: "18".to_string(),
            container: "mp4".to_string(),
            has_video: true,
            has_audio: true,
            size_bytes: Some(1),
            size_approx_bytes: None,
            preference: 0.0,
        };
        DownloadPlan::combined(&f, 1)
    }

    fn merged_plan() -> DownloadPlan {
        DownloadPlan {
            kind: PlanKind::Merged,
            selector: "137+140".to_string(),
            estimated_size_bytes: 2,
            container: "mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn success_reports_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new("printf data > \"$1\"")));

        let result = downloader
            .execute(&combined_plan(), "https://x.test", &out, Duration::from_secs(10))
            .await;

        assert_eq!(
            result,
            DownloadResult::Succeeded {
                output_path: out.clone(),
                plan: combined_plan(),
            }
        );
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "data");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 'ERROR: HTTP Error 403: Forbidden' >&2; exit 3";
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new(script)));

        let result = downloader
            .execute(
                &combined_plan(),
                "https://x.test",
                &dir.path().join("o.mp4"),
                Duration::from_secs(10),
            )
            .await;

        match result {
            DownloadResult::Failed { reason, diagnostic } => {
                assert_eq!(reason, FailureReason::NonZeroExit { code: Some(3) });
                assert_eq!(reason.to_string(), "fetcher exited nonzero");
                assert_eq!(diagnostic.kind, DiagnosticKind::AccessDenied);
                assert!(diagnostic.text.contains("403"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new(&script)));

        let started = Instant::now();
        let result = downloader
            .execute(
                &combined_plan(),
                "https://x.test",
                &dir.path().join("o.mp4"),
                Duration::from_millis(500),
            )
            .await;

        assert_eq!(
            result,
            DownloadResult::TimedOut {
                after: Duration::from_millis(500)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .status()
            .unwrap()
            .success();
        assert!(!alive, "fetcher process {} still running", pid.trim());
    }

    #[tokio::test]
    async fn timeout_kills_processes_the_fetcher_started() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("o.mp4");
        let script = "sleep 30 & echo $! > \"$1.helper\"; wait";
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new(script)));

        let result = downloader
            .execute(&combined_plan(), "https://x.test", &out, Duration::from_millis(500))
            .await;
        assert!(matches!(result, DownloadResult::TimedOut { .. }));

        let pid = std::fs::read_to_string(dir.path().join("o.mp4.helper")).unwrap();
        assert!(
            !still_running(&pid).await,
            "helper process {} outlived the fetcher",
            pid.trim()
        );
    }

    #[tokio::test]
    async fn leftover_helper_holding_pipes_does_not_extend_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new("sleep 4 & exit 0")));

        let started = Instant::now();
        let result = downloader
            .execute(
                &combined_plan(),
                "https://x.test",
                &dir.path().join("o.mp4"),
                Duration::from_millis(500),
            )
            .await;

        assert!(matches!(result, DownloadResult::Succeeded { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn race_between_exit_and_deadline_resolves_once() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Arc::new(ScriptFetcher::new("sleep 0.1")));

        for _ in 0..5 {
            let result = downloader
                .execute(
                    &combined_plan(),
                    "https://x.test",
                    &dir.path().join("o.mp4"),
                    Duration::from_millis(100),
                )
                .await;
            assert!(matches!(
                result,
                DownloadResult::Succeeded { .. } | DownloadResult::TimedOut { .. }
            ));
        }
    }

    #[tokio::test]
    async fn missing_executable_is_fetcher_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = ScriptFetcher::new("true");
        fetcher.program = "/nonexistent/yt-dlp";
        let downloader = Downloader::new(Arc::new(fetcher));

        let result = downloader
            .execute(
                &combined_plan(),
                "https://x.test",
                &dir.path().join("o.mp4"),
                Duration::from_secs(5),
            )
            .await;

        match result {
            DownloadResult::Failed { reason, diagnostic } => {
                assert_eq!(reason, FailureReason::FetcherUnavailable);
                assert_eq!(diagnostic.kind, DiagnosticKind::ExecutableMissing);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn merge_without_ffmpeg_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("o.mp4");
        let mut fetcher = ScriptFetcher::new("printf data > \"$1\"");
        fetcher.merge_tool = false;
        let downloader = Downloader::new(Arc::new(fetcher));

        let result = downloader
            .execute(&merged_plan(), "https://x.test", &out, Duration::from_secs(5))
            .await;

        match result {
            DownloadResult::Failed { reason, diagnostic } => {
                assert_eq!(reason, FailureReason::FetcherUnavailable);
                assert_eq!(diagnostic.kind, DiagnosticKind::MergeToolMissing);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!out.exists());
    }
}
