//! Admission error types

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Why a gate refused to admit a caller.
///
/// None of these are fatal: each one rejects a single request and the caller
/// is expected to answer "try again later". They are kept apart so queue
/// pressure and slow backends can be told apart in logs.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Hash)]
pub enum AdmissionError {
    /// The waiting stack was already at `max_stack_size`.
    #[error("admission queue is full")]
    QueueFull,

    /// The caller waited longer than the gate's timeout without being admitted.
    #[error("timed out waiting for admission")]
    Timeout,

    /// The gate was closed before or while the caller was waiting.
    ///
    /// Only observable while a route table is being swapped.
    #[error("admission gate is closed")]
    Closed,
}

impl AdmissionError {
    /// Stable machine-readable code used in response bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::QueueFull => "ADMISSION_QUEUE_FULL",
            AdmissionError::Timeout => "ADMISSION_TIMEOUT",
            AdmissionError::Closed => "ADMISSION_CLOSED",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        let mut response = (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        response
    }
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Configuration error for gate parameters and config-file loading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `max_concurrency` is zero, which would never admit anything.
    #[error("max concurrency must be greater than 0")]
    InvalidConcurrency,

    /// The wait timeout is zero.
    #[error("admission timeout must be greater than 0 ms")]
    InvalidTimeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parsing error: {0}")]
    Parse(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn every_admission_error_is_service_unavailable() {
        for err in [
            AdmissionError::QueueFull,
            AdmissionError::Timeout,
            AdmissionError::Closed,
        ] {
            let resp = err.into_response();
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "1");
        }
    }

    #[tokio::test]
    async fn response_body_carries_error_code() {
        let resp = AdmissionError::Timeout.into_response();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "ADMISSION_TIMEOUT");
        assert_eq!(body["error"]["message"], "timed out waiting for admission");
    }
}
