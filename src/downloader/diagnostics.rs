// Fetcher diagnostics - classifies yt-dlp stderr
//
// The text is kept for operators; the kind is the only part callers
// should branch on.

use regex::Regex;
use serde::Serialize;

/// How much stderr to keep in a failure report
const MAX_DIAGNOSTIC_LINES: usize = 20;
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// ffmpeg/ffprobe is needed to merge streams but is missing
    MergeToolMissing,
    /// The fetcher executable itself could not be started
    ExecutableMissing,
    /// The requested format id no longer exists upstream
    FormatUnavailable,
    /// HTTP 403 / 429 / bot check
    AccessDenied,
    /// Private, removed or geo-blocked media
    Unavailable,
    Other,
}

impl DiagnosticKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::MergeToolMissing => "merge tool (ffmpeg) is not installed",
            Self::ExecutableMissing => "fetcher executable not found",
            Self::FormatUnavailable => "requested format is not available",
            Self::AccessDenied => "access denied by the media host",
            Self::Unavailable => "media is unavailable",
            Self::Other => "fetcher failed",
        }
    }
}

/// Classified stderr tail of a fetcher run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub text: String,
}

impl Diagnostic {
    /// Classify raw stderr and keep its tail
    pub fn from_stderr(stderr: &str) -> Self {
        Self {
            kind: diagnose(stderr),
            text: tail(stderr),
        }
    }

    pub fn merge_tool_missing(detail: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::MergeToolMissing,
            text: detail.into(),
        }
    }

    pub fn executable_missing(detail: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::ExecutableMissing,
            text: detail.into(),
        }
    }
}

/// Analyze error text and determine the failure kind
pub fn diagnose(stderr: &str) -> DiagnosticKind {
    lazy_static::lazy_static! {
        static ref MERGE_TOOL_RE: Regex = Regex::new(
            r"(?i)(ffmpeg|ffprobe|avconv)[^\n]*(not (be )?found|not installed)"
        ).unwrap();
        static ref EXECUTABLE_RE: Regex = Regex::new(
            r"(?i)(command not found|no such file or directory)"
        ).unwrap();
        static ref FORMAT_RE: Regex = Regex::new(
            r"(?i)requested format is not available"
        ).unwrap();
        static ref ACCESS_RE: Regex = Regex::new(
            r"(?i)(http error 403|forbidden|http error 429|too many requests|sign in to confirm)"
        ).unwrap();
        static ref UNAVAILABLE_RE: Regex = Regex::new(
            r"(?i)(private video|video unavailable|has been removed|not available in your country)"
        ).unwrap();
    }

    if MERGE_TOOL_RE.is_match(stderr) {
        DiagnosticKind::MergeToolMissing
    } else if FORMAT_RE.is_match(stderr) {
        DiagnosticKind::FormatUnavailable
    } else if ACCESS_RE.is_match(stderr) {
        DiagnosticKind::AccessDenied
    } else if UNAVAILABLE_RE.is_match(stderr) {
        DiagnosticKind::Unavailable
    } else if EXECUTABLE_RE.is_match(stderr) {
        DiagnosticKind::ExecutableMissing
    } else {
        DiagnosticKind::Other
    }
}

/// Last lines of `text`, bounded in both lines and bytes
fn tail(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(MAX_DIAGNOSTIC_LINES);
    let joined = lines[start..].join("\n");

    if joined.len() <= MAX_DIAGNOSTIC_BYTES {
        return joined;
    }

    let mut cut = joined.len() - MAX_DIAGNOSTIC_BYTES;
    while !joined.is_char_boundary(cut) {
        cut += 1;
    }
    joined[cut..].to_string()
}
