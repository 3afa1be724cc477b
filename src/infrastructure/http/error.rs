//! HTTP Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::ApplicationError;

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub error: String,
    pub data: Option<()>,
}

impl ErrorResponse {
    pub fn new(errno: i32, error: impl Into<String>) -> Self {
        Self {
            errno,
            error: error.into(),
            data: None,
        }
    }
}

/// 错误码定义
pub mod errno {
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const UNPROCESSABLE: i32 = 422;
    pub const INTERNAL_ERROR: i32 = 500;
    pub const SERVICE_UNAVAILABLE: i32 = 503;
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// 模型拒绝输入或推理失败
    Unprocessable(String),
    Internal(String),
    Conflict(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn parts(&self) -> (i32, &str) {
        match self {
            ApiError::NotFound(msg) => (errno::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (errno::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (errno::UNPROCESSABLE, msg),
            ApiError::Internal(msg) => (errno::INTERNAL_ERROR, msg),
            ApiError::Conflict(msg) => (errno::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (errno::SERVICE_UNAVAILABLE, msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = self.parts();
        if code >= errno::INTERNAL_ERROR {
            tracing::error!(errno = code, error = %msg, "API error");
        } else {
            tracing::warn!(errno = code, error = %msg, "API request rejected");
        }

        // 业务错误统一返回 200，由 errno 区分
        (StatusCode::OK, Json(ErrorResponse::new(code, msg))).into_response()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
            ApplicationError::ModelError(remote) => ApiError::Unprocessable(remote.to_string()),
            ApplicationError::ExternalServiceError(msg) | ApplicationError::TransportError(msg) => {
                ApiError::ServiceUnavailable(msg)
            }
            ApplicationError::ConfigurationError(msg) | ApplicationError::InternalError(msg) => {
                ApiError::Internal(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::JobError;

    #[test]
    fn test_application_error_mapping() {
        let err: ApiError = ApplicationError::validation("bad speed").into();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "bad speed"));

        let err: ApiError = ApplicationError::from(JobError::NotFound("j1".to_string())).into();
        assert_eq!(err.parts().0, errno::NOT_FOUND);

        let err: ApiError = ApplicationError::from(JobError::QueueFull).into();
        assert_eq!(err.parts().0, errno::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError::Conflict("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["errno"], 409);
        assert_eq!(json["error"], "busy");
        assert!(json["data"].is_null());
    }
}
