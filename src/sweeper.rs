// Retention sweeper - removes aged downloads from the output directory
//
// Runs on its own timer, never touches request state. Per-entry failures
// are logged and skipped.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Outcome of one pass over the directory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct RetentionSweeper {
    dir: PathBuf,
    retention: Duration,
    interval: Duration,
}

/// Creation time, or modification time where the platform has none
pub fn birth_time(_path: &Path, metadata: &Metadata) -> io::Result<SystemTime> {
    metadata.created().or_else(|_| metadata.modified())
}

impl RetentionSweeper {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
            interval,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.output_dir, config.retention, config.sweep_interval)
    }

    /// Sweep now and then every interval until `shutdown` fires
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.sweep_once().await;
                        if report.removed > 0 || report.failed > 0 {
                            tracing::info!(
                                scanned = report.scanned,
                                removed = report.removed,
                                failed = report.failed,
                                "sweep finished"
                            );
                        }
                    }
                }
            }
        })
    }

    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep_at(SystemTime::now(), birth_time).await
    }

    /// One pass using `now` and a custom timestamp source
    pub async fn sweep_at<F>(&self, now: SystemTime, timestamp_of: F) -> SweepReport
    where
        F: Fn(&Path, &Metadata) -> io::Result<SystemTime>,
    {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(dir = %self.dir.display(), error = %e, "cannot open output directory");
                }
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %self.dir.display(), error = %e, "cannot list output directory");
                    report.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            report.scanned += 1;

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot stat entry");
                    report.failed += 1;
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let born = match timestamp_of(&path, &metadata) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read file time");
                    report.failed += 1;
                    continue;
                }
            };

            // Timestamps in the future count as brand new
            let age = now.duration_since(born).unwrap_or(Duration::ZERO);
            if age <= self.retention {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed aged file");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot remove aged file");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
