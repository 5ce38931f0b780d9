// Downloader module - catalog parsing, format selection and orchestration

pub mod backends;
pub mod catalog;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;

pub use backends::YtDlpFetcher;
pub use catalog::parse_catalog;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use errors::{FetchError, SelectionError};
pub use format_selector::{FormatSelector, DEFAULT_EXTENSIONS};
pub use models::{Catalog, DownloadPlan, DownloadResult, FailureReason, FormatDescriptor, PlanKind};
pub use orchestrator::Downloader;
pub use traits::{DownloadInvocation, Fetcher};
