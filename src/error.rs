use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The single rejection outcome of admission control.
///
/// Renders as a bare `429 Too Many Requests`; the retry hint is kept for
/// logging and for callers using the controller directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited, next token in {retry_after:?}")]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        StatusCode::TOO_MANY_REQUESTS.into_response()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bucket capacity must be at least 1")]
    ZeroCapacity,
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}
