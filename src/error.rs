use axum::{Json, http::StatusCode, response::IntoResponse};
use std::any::Any;

use crate::models::ChatReply;
use crate::normalize::{FormatError, INVALID_BODY_REPLY};
use crate::validate::ValidationError;

pub const EMPTY_MESSAGE_REPLY: &str = "Please type a message.";
pub const MODEL_LOADING_REPLY: &str =
    "The model is loading on the inference service. Please wait a few seconds and try again.";
pub const MODEL_NOT_FOUND_REPLY: &str =
    "Model not found on the inference service. Check the configured model identifier.";
pub const TIMEOUT_REPLY: &str = "The model took too long to respond. Please try again.";
pub const UNREACHABLE_REPLY: &str = "Internal error: the inference service could not be reached.";
pub const INTERNAL_REPLY: &str = "Internal server error.";

/// Terminal state of a chat request, used for logs, metrics and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 200 with an explanatory reply instead of a generation.
    SoftWarning,
    ClientError,
    Retryable,
    ConfigError,
    UpstreamFailure,
    FormatError,
    InternalError,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::SoftWarning => "soft_warning",
            Outcome::ClientError => "client_error",
            Outcome::Retryable => "retryable",
            Outcome::ConfigError => "config_error",
            Outcome::UpstreamFailure => "upstream_failure",
            Outcome::FormatError => "format_error",
            Outcome::InternalError => "internal_error",
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub outcome: Outcome,
    pub reply: String,
    /// Log-only detail; never sent to the caller.
    pub detail: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, outcome: Outcome, reply: impl Into<String>) -> Self {
        Self {
            status,
            outcome,
            reply: reply.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn model_loading() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, Outcome::Retryable, MODEL_LOADING_REPLY)
    }

    pub fn timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, Outcome::Retryable, TIMEOUT_REPLY)
    }

    pub fn model_not_found(model: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, Outcome::ConfigError, MODEL_NOT_FOUND_REPLY)
            .with_detail(format!("model={}", model))
    }

    /// Surfaces the upstream status and body; `credential` is scrubbed from
    /// the body in case the service echoes request headers.
    pub fn upstream_failure(status: u16, body: &[u8], credential: Option<&str>) -> Self {
        let body = redact(&String::from_utf8_lossy(body), credential);
        let reply = if body.trim().is_empty() {
            format!("Inference service error {}.", status)
        } else {
            format!("Inference service error {}: {}", status, body)
        };
        Self::new(StatusCode::BAD_GATEWAY, Outcome::UpstreamFailure, reply)
    }

    pub fn unreachable(url: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Outcome::InternalError,
            UNREACHABLE_REPLY,
        )
        .with_detail(format!("url={}", url))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, Outcome::InternalError, INTERNAL_REPLY)
            .with_detail(detail)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Outcome::ClientError, EMPTY_MESSAGE_REPLY)
            .with_detail(err.to_string())
    }
}

impl From<FormatError> for AppError {
    fn from(err: FormatError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, Outcome::FormatError, INVALID_BODY_REPLY)
            .with_detail(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(ChatReply::new(self.reply))).into_response()
    }
}

/// Response for a panicked handler, installed through `CatchPanicLayer`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(outcome = Outcome::InternalError.as_str(), "handler panicked: {}", detail);
    AppError::internal(detail).into_response()
}

pub fn redact(text: &str, credential: Option<&str>) -> String {
    match credential {
        Some(secret) if !secret.is_empty() => text.replace(secret, "[redacted]"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failure_carries_status_and_body() {
        let err = AppError::upstream_failure(429, br#"{"error":"Rate limit reached"}"#, None);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.outcome, Outcome::UpstreamFailure);
        assert!(err.reply.contains("429"));
        assert!(err.reply.contains("Rate limit reached"));
    }

    #[test]
    fn upstream_failure_never_leaks_credential() {
        let err = AppError::upstream_failure(
            401,
            b"invalid token: Bearer hf_live_secret",
            Some("hf_live_secret"),
        );
        assert!(!err.reply.contains("hf_live_secret"));
        assert!(err.reply.contains("[redacted]"));
    }

    #[test]
    fn empty_upstream_body_still_reports_status() {
        let err = AppError::upstream_failure(500, b"", None);
        assert_eq!(err.reply, "Inference service error 500.");
    }

    #[test]
    fn detail_stays_out_of_reply() {
        let err = AppError::internal("socket exploded at 0xdeadbeef");
        assert_eq!(err.reply, INTERNAL_REPLY);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_per_error_kind() {
        assert_eq!(AppError::from(ValidationError::EmptyMessage).status, StatusCode::BAD_REQUEST);
        assert_eq!(AppError::model_loading().status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::timeout().status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(AppError::model_not_found("x/y").status, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::unreachable("http://127.0.0.1:1").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
