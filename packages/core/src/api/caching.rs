//! Conditional-GET support for the list endpoints.
//!
//! ETags are computed from the serialized response body, so any catalog
//! change produces a new tag. Clients replaying `If-None-Match` get a
//! 304 with no body.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use serde_json::Value;

use super::internal_error;

/// Compute a quoted ETag from response bytes.
pub fn compute_etag(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

fn cache_control(max_age: u32) -> HeaderValue {
    HeaderValue::from_str(&format!("max-age={}", max_age))
        .expect("cache-control header value should be valid")
}

/// True when `If-None-Match` names `current_etag` (or is `*`).
pub fn if_none_match_matches(headers: &HeaderMap, current_etag: &str) -> bool {
    let raw = match headers.get(header::IF_NONE_MATCH).map(|v| v.to_str()) {
        Some(Ok(raw)) => raw,
        _ => return false,
    };
    raw.split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == current_etag)
}

/// Serialize `payload` and answer 200 with an ETag, or 304 when the
/// client already holds the current representation.
pub fn conditional_json<T: Serialize>(
    request_headers: &HeaderMap,
    max_age: u32,
    payload: &T,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let body = serde_json::to_vec(payload)
        .map_err(|err| internal_error(format!("response serialization failed: {}", err)))?;
    let etag = compute_etag(&body);

    if if_none_match_matches(request_headers, &etag) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::CACHE_CONTROL, cache_control(max_age))
            .header(header::ETAG, etag)
            .body(Body::empty())
            .map_err(|err| internal_error(err.to_string()));
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, cache_control(max_age))
        .header(header::ETAG, etag)
        .body(Body::from(body))
        .map_err(|err| internal_error(err.to_string()))
}
