use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Taxonomy:
/// - `InvalidInput` — client mistake, surfaced verbatim, never retried.
/// - `RateLimited` — transient capacity condition; carries a retry hint.
/// - `TemplateNotFound` / `MissingVariables` — server misconfiguration,
///   operator-actionable, never retried.
/// - `GatewayAuth` / `GatewayRejected` — non-retryable provider failures.
/// - `GatewayUnavailable` — retry budget exhausted against the provider.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("No template registered for category '{0}'")]
    TemplateNotFound(String),

    #[error("Template variables missing from request: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),

    #[error("Gateway rejected request: {0}")]
    GatewayRejected(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after_secs} seconds."),
            ),
            AppError::TemplateNotFound(category) => {
                tracing::error!("No proposal template registered for category '{category}'");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TEMPLATE_NOT_FOUND",
                    format!("No proposal template is configured for '{category}'"),
                )
            }
            AppError::MissingVariables(names) => {
                tracing::error!("Prompt build failed, missing variables: {names:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MISSING_VARIABLES",
                    format!("Template variables could not be filled: {}", names.join(", ")),
                )
            }
            AppError::GatewayAuth(msg) => {
                tracing::error!("Gateway auth failure: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GATEWAY_AUTH",
                    "AI provider authentication failed".to_string(),
                )
            }
            AppError::GatewayRejected(msg) => {
                tracing::error!("Gateway rejected request: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GATEWAY_REJECTED",
                    "AI provider rejected the request".to_string(),
                )
            }
            AppError::GatewayUnavailable(msg) => {
                tracing::error!("Gateway unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GATEWAY_UNAVAILABLE",
                    "AI provider is temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_response_carries_retry_after_header() {
        let response = AppError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            HeaderValue::from_static("42")
        );
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        let response = AppError::InvalidInput("jobTitle cannot be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_template_not_found_maps_to_500() {
        let response = AppError::TemplateNotFound("design".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
