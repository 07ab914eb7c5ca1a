//! Pre-shared key guard for endpoints that reach the network.
//!
//! Reads of the cached playlist are open; a manual refresh costs an upstream fetch
//! and a cache rewrite, so it requires the configured key when one is set.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, AppErrorWithRevision};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware rejecting requests that do not carry `expected_psk`.
///
/// With no key configured every request passes (dev mode). Rejections report
/// `revision_id`, the revision the cache is serving.
pub async fn require_refresh_key(
    expected_psk: Option<String>,
    revision_id: i64,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    match presented_key(request.headers()) {
        Some(key) if constant_time_compare(key, &expected) => next.run(request).await,
        Some(_) => unauthorized("Invalid API key", revision_id),
        None => unauthorized("Missing API key", revision_id),
    }
}

/// Key from `x-api-key`, falling back to an `Authorization: Bearer` token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized(message: &str, revision_id: i64) -> Response {
    AppErrorWithRevision {
        error: AppError::Unauthorized(message.to_string()),
        revision_id,
    }
    .into_response()
}
