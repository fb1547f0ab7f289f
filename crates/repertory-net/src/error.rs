//! Transport-layer error conversions (spec §4.3).
//!
//! `reqwest` errors are folded into the shared [`repertory_common::ApiError`]
//! taxonomy so providers never need to know which HTTP client is underneath.

use std::error::Error as _;

use repertory_common::ApiError;

/// Classifies a `reqwest` failure the way `repertory_common::ApiError`'s
/// `is_retryable` predicate expects: only DNS-resolution failures are
/// transient-retryable here, matching the original's DNS-cache-only retry
/// policy (spec §4.3 "Retries").
#[must_use]
pub fn is_dns_failure(err: &reqwest::Error) -> bool {
    err.is_connect()
        && err
            .source()
            .is_some_and(|source| source.to_string().contains("dns error"))
}

pub fn to_api_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::CommError(format!("request timed out: {err}"))
    } else if is_dns_failure(&err) {
        ApiError::CommError(format!("dns resolution failed: {err}"))
    } else if err.is_connect() {
        ApiError::CommError(format!("connection failed: {err}"))
    } else {
        ApiError::CommError(err.to_string())
    }
}
