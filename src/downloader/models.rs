// Common data models for the downloader

use std::path::PathBuf;
use std::time::Duration;

use super::diagnostics::Diagnostic;

/// One encoding from the fetcher's catalog
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
    /// Format ID passed back to the fetcher (e.g. "137", "140")
    pub id: String,
    /// Container / file extension (mp4, webm, m4a)
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Exact file size in bytes
    pub size_bytes: Option<u64>,
    /// Approximate file size (when exact is unknown)
    pub size_approx_bytes: Option<u64>,
    /// Quality hint from the source, higher is better
    pub preference: f64,
}

impl FormatDescriptor {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.size_bytes.or(self.size_approx_bytes)
    }

    pub fn is_combined(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Ordered formats for a single media URL, scoped to one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    formats: Vec<FormatDescriptor>,
}

impl Catalog {
    pub fn new(formats: Vec<FormatDescriptor>) -> Self {
        Self { formats }
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// One format that already carries both tracks
    Combined,
    /// A video-only and an audio-only format muxed by the fetcher
    Merged,
}

/// What the selector decided to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub kind: PlanKind,
    /// `id` for combined, `{video}+{audio}` for merged
    pub selector: String,
    pub estimated_size_bytes: u64,
    /// Container of the file the fetcher will write
    pub container: String,
}

impl DownloadPlan {
    pub fn combined(format: &FormatDescriptor, size: u64) -> Self {
        Self {
            kind: PlanKind::Combined,
            selector: format.id.clone(),
            estimated_size_bytes: size,
            container: format.container.clone(),
        }
    }

    pub fn merged(video: &FormatDescriptor, audio: &FormatDescriptor, size: u64) -> Self {
        let container = if video.container == audio.container {
            video.container.clone()
        } else {
            "mp4".to_string()
        };

        Self {
            kind: PlanKind::Merged,
            selector: format!("{}+{}", video.id, audio.id),
            estimated_size_bytes: size,
            container,
        }
    }

    pub fn requires_muxing(&self) -> bool {
        self.kind == PlanKind::Merged
    }

    /// Estimated size in MiB, rounded to two decimals
    pub fn estimated_size_mb(&self) -> f64 {
        let mb = self.estimated_size_bytes as f64 / 1_048_576.0;
        (mb * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The fetcher (or its merge dependency) could not be launched
    FetcherUnavailable,
    /// The fetcher ran and reported failure
    NonZeroExit { code: Option<i32> },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetcherUnavailable => write!(f, "fetcher unavailable"),
            Self::NonZeroExit { .. } => write!(f, "fetcher exited nonzero"),
        }
    }
}

/// Terminal outcome of one orchestrated download
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    Succeeded {
        output_path: PathBuf,
        plan: DownloadPlan,
    },
    Failed {
        reason: FailureReason,
        diagnostic: Diagnostic,
    },
    TimedOut {
        after: Duration,
    },
}
