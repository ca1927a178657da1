//! 429 responses for throttled requests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

pub const REJECTION_ERROR: &str = "Too Many Requests";
pub const REJECTION_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// JSON body sent with every rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionBody {
    pub error: &'static str,
    pub message: &'static str,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

/// What the responder needs to know about the denied request.
#[derive(Debug, Clone, Copy)]
pub struct RejectionContext<'a> {
    pub client: &'a str,
    pub path: &'a str,
    pub max_requests: usize,
    pub window: Duration,
}

/// Build the 429 response and emit the security log record.
pub fn reject(ctx: &RejectionContext<'_>) -> Response {
    let window_secs = ctx.window.as_secs();
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    tracing::warn!(
        client = %ctx.client,
        path = %ctx.path,
        timestamp_ms,
        "SECURITY: rate limit exceeded"
    );

    let body = RejectionBody {
        error: REJECTION_ERROR,
        message: REJECTION_MESSAGE,
        retry_after: window_secs,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(window_secs));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(ctx.max_requests));
    if let Ok(value) = HeaderValue::from_str(&format!("{} minutes", window_secs / 60)) {
        headers.insert(X_RATELIMIT_WINDOW, value);
    }
    response
}
