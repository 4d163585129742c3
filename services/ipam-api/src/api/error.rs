use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ipscope_engine::EngineError;
use serde::Serialize;

/// Seconds a client should wait before retrying a contended reservation.
const CONTENTION_RETRY_AFTER_SECONDS: u32 = 1;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    pub retry_after_seconds: u32,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("urn:ipscope:problem:{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
            retry_after_seconds: 0,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }

    fn set_retry_after_seconds(&mut self, seconds: u32) {
        self.retry_after_seconds = seconds;
        if seconds > 0 {
            self.retryable = true;
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn unprocessable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }

    pub fn with_retry_after_seconds(mut self, seconds: u32) -> Self {
        self.problem.set_retry_after_seconds(seconds);
        self
    }

    /// Map an engine error, logging store failures.
    pub fn from_engine(err: EngineError, request_id: &str) -> Self {
        let code = err.code();
        let api = match &err {
            EngineError::InvalidSubnetFormat(_) | EngineError::InvalidAddress(_) => {
                Self::bad_request(code, err.to_string())
            }
            EngineError::UnboundedEnumerationRequested { .. } => {
                Self::unprocessable(code, err.to_string())
            }
            EngineError::NoCapacityAvailable(_) | EngineError::AddressAlreadyClaimed { .. } => {
                Self::conflict(code, err.to_string())
            }
            EngineError::ReservationContention { .. } => Self::service_unavailable(code, err.to_string())
                .with_retry_after_seconds(CONTENTION_RETRY_AFTER_SECONDS),
            EngineError::Store(store) => {
                tracing::error!(error = %store, request_id = %request_id, "Store operation failed");
                Self::internal(code, "Inventory store operation failed")
            }
        };
        api.with_request_id(request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipscope_engine::StoreError;
    use rstest::rstest;

    #[rstest]
    #[case(EngineError::InvalidSubnetFormat("x".into()), StatusCode::BAD_REQUEST, "invalid_subnet_format")]
    #[case(EngineError::InvalidAddress("x".into()), StatusCode::BAD_REQUEST, "invalid_address_format")]
    #[case(
        EngineError::UnboundedEnumerationRequested { requested: 10, ceiling: 1 },
        StatusCode::UNPROCESSABLE_ENTITY,
        "unbounded_enumeration"
    )]
    #[case(EngineError::NoCapacityAvailable("10.0.0.0/30".into()), StatusCode::CONFLICT, "no_capacity_available")]
    #[case(
        EngineError::ReservationContention { subnet: "10.0.0.0/30".into(), attempts: 3 },
        StatusCode::SERVICE_UNAVAILABLE,
        "reservation_contention"
    )]
    #[case(
        EngineError::Store(StoreError::Unavailable("down".into())),
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error"
    )]
    fn test_engine_error_mapping(
        #[case] err: EngineError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let api = ApiError::from_engine(err, "req_test");
        assert_eq!(api.status, status);
        assert_eq!(api.problem.code, code);
        assert_eq!(api.problem.request_id, "req_test");
    }

    #[test]
    fn test_contention_is_retryable() {
        let api = ApiError::from_engine(
            EngineError::ReservationContention {
                subnet: "10.0.0.0/30".into(),
                attempts: 3,
            },
            "req_test",
        );
        assert!(api.problem.retryable);
        assert_eq!(api.problem.retry_after_seconds, CONTENTION_RETRY_AFTER_SECONDS);
    }

    #[test]
    fn test_store_detail_is_not_leaked() {
        let api = ApiError::from_engine(
            EngineError::Store(StoreError::Unavailable("password=hunter2".into())),
            "req_test",
        );
        assert!(!api.problem.detail.contains("hunter2"));
    }
}
