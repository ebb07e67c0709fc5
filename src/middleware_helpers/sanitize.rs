use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::ErrorResponse;

/// Maximum allowed request body size (1MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Replacement written in place of any sensitive value
pub const REDACTED: &str = "[REDACTED]";

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|token|secret|api_key|credit_card").expect("static regex")
});

/// Whether a JSON key names a credential-like value.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Returns a copy of `value` with every sensitive key's value replaced by [`REDACTED`].
///
/// Objects are walked recursively. Arrays are walked element by element, but only
/// object and array elements are inspected; bare primitives in an array are kept as is.
pub fn redact_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_object(map)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(_) | Value::Array(_) => redact_sensitive(item),
                    primitive => primitive.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                redact_sensitive(value)
            };
            (key.clone(), value)
        })
        .collect()
}

/// Rejects requests whose declared body exceeds [`MAX_BODY_SIZE`].
pub async fn body_limit_middleware(request: Request, next: Next) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared.filter(|len| *len > MAX_BODY_SIZE) {
        warn!("Request body too large: {} bytes", length);
        let body = ErrorResponse {
            ok: false,
            error: "payload_too_large".to_string(),
            message: format!("Request body exceeds {} bytes", MAX_BODY_SIZE),
            request_id: crate::tracing::current_request_id().map(|rid| rid.0),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        return (StatusCode::PAYLOAD_TOO_LARGE, axum::Json(body)).into_response();
    }

    next.run(request).await
}
