//! Request-scoped context extracted from HTTP requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use ipscope_engine::EngineError;

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// Map an engine error into a problem response for this request.
    pub fn engine_error(&self, err: EngineError) -> ApiError {
        ApiError::from_engine(err, &self.request_id)
    }

    pub fn bad_request(&self, code: &str, message: impl Into<String>) -> ApiError {
        ApiError::bad_request(code, message).with_request_id(self.request_id.clone())
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| format!("req_{}", ulid::Ulid::new()));

        Ok(Self { request_id })
    }
}
