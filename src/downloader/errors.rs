// Error types for format selection and the fetcher

use thiserror::Error;

/// Why the selector could not produce a plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Nothing in the catalog matches the container/track/size constraints
    #[error("no format matches the allowed containers with a known size")]
    NoViableFormats,

    /// The best video + best audio pairing still exceeds the budget
    #[error("best available pairing is {combined_size} bytes, budget is {budget} bytes")]
    TooLarge { combined_size: u64, budget: u64 },
}

/// Failures of a single fetcher call (info retrieval)
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// yt-dlp (or a tool it needs) not found in the system
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The call did not finish before its deadline
    #[error("timed out after {0}s")]
    TimedOut(u64),

    /// The tool ran and exited with a failure status
    #[error("fetcher exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Output was not the JSON document we expected
    #[error("parse error: {0}")]
    ParseError(String),

    /// Pipe or process plumbing failed
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::ToolNotFound(e.to_string())
        } else {
            Self::Io(e.to_string())
        }
    }
}
