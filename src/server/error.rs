// HTTP error mapping

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::downloader::{Diagnostic, FailureReason, FetchError, SelectionError};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<Diagnostic>,
}

/// A failed request: status, machine code, human message
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub diagnostic: Option<Diagnostic>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            diagnostic: None,
        }
    }

    fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn missing_url() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MISSING_URL", "request body must contain a url")
    }

    pub fn info_unavailable(err: FetchError) -> Self {
        let diagnostic = match &err {
            FetchError::ToolNotFound(detail) => Diagnostic::executable_missing(detail.clone()),
            FetchError::NonZeroExit { stderr, .. } => Diagnostic::from_stderr(stderr),
            other => Diagnostic::from_stderr(&other.to_string()),
        };

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INFO_UNAVAILABLE",
            "could not retrieve information",
        )
        .with_diagnostic(diagnostic)
    }

    pub fn fetcher_failed(reason: FailureReason, diagnostic: Diagnostic) -> Self {
        let code = match reason {
            FailureReason::FetcherUnavailable => "FETCHER_UNAVAILABLE",
            FailureReason::NonZeroExit { .. } => "FETCHER_FAILED",
        };

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            format!("{}: {}", reason, diagnostic.kind.description()),
        )
        .with_diagnostic(diagnostic)
    }

    pub fn download_timeout(after: Duration) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "DOWNLOAD_TIMEOUT",
            format!("download did not finish within {}s", after.as_secs()),
        )
    }

    pub fn request_timeout(after: Duration) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "REQUEST_TIMEOUT",
            format!("request did not finish within {}s", after.as_secs()),
        )
    }
}

impl From<SelectionError> for ApiError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoViableFormats => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "NO_VIABLE_FORMATS",
                err.to_string(),
            ),
            SelectionError::TooLarge { .. } => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "TOO_LARGE", err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
            diagnostic: self.diagnostic,
        });

        (self.status, body).into_response()
    }
}
