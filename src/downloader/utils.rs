// Helper functions for fetcher implementations

use std::process::Stdio;
use std::time::Duration;

use time::macros::format_description;
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use super::errors::FetchError;

/// Longest URL fragment kept in an output file name
const MAX_FRAGMENT_LEN: usize = 48;

/// Kills the whole process group of a spawned child when dropped.
///
/// Children spawned through [`isolate_process_group`] lead their own group,
/// so this also reaches helpers they started (ffmpeg during merges).
pub struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    pub fn of(child: &Child) -> Self {
        Self { leader: child.id() }
    }

    /// SIGKILL every process left in the group. Idempotent.
    pub fn kill(&mut self) {
        if let Some(leader) = self.leader.take() {
            kill_group(leader);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Make the command's child the leader of a new process group
#[cfg(unix)]
pub fn isolate_process_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
pub fn isolate_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_group(leader: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(leader as i32), Signal::SIGKILL) {
        // Nothing left in the group
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = leader, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}

/// Await a reader task until `deadline`, aborting it past that point
pub async fn join_until<T>(deadline: Instant, mut task: JoinHandle<T>) -> Option<T> {
    match timeout_at(deadline, &mut task).await {
        Ok(joined) => joined.ok(),
        Err(_) => {
            task.abort();
            None
        }
    }
}

/// Run command with timeout, killing it and its helpers when the deadline passes
pub async fn run_output_with_timeout(
    mut command: Command,
    limit: Duration,
) -> Result<std::process::Output, FetchError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    isolate_process_group(&mut command);

    let mut child = command.spawn()?;
    let mut group = ProcessGroup::of(&child);
    let deadline = Instant::now() + limit;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| FetchError::Io("failed to capture stdout".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| FetchError::Io("failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout_at(deadline, child.wait()).await {
        Ok(status) => {
            let status = status?;
            // Leftover helpers would keep the pipes open
            group.kill();

            let stdout = join_until(deadline, stdout_task)
                .await
                .ok_or_else(|| FetchError::Io("stdout reader did not finish".to_string()))??;
            let stderr = join_until(deadline, stderr_task)
                .await
                .ok_or_else(|| FetchError::Io("stderr reader did not finish".to_string()))??;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            group.kill();
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(FetchError::TimedOut(limit.as_secs()))
        }
    }
}

/// URL reduced to a short, filesystem-safe fragment
pub fn sanitize_url_fragment(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);

    let mut out = String::with_capacity(without_scheme.len());
    let mut prev_underscore = false;
    for c in without_scheme.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }

    let trimmed = out.trim_matches('_');
    let fragment: String = trimmed.chars().take(MAX_FRAGMENT_LEN).collect();
    let fragment = fragment.trim_end_matches('_');

    if fragment.is_empty() {
        "media".to_string()
    } else {
        fragment.to_string()
    }
}

/// `{timestamp}_{fragment}.{container}`, unique per URL and millisecond
pub fn output_file_name(url: &str, container: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day]T[hour][minute][second][subsecond digits:3]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());

    format!("{}_{}.{}", stamp, sanitize_url_fragment(url), container)
}
