//! # Application Error Types
//!
//! This module defines the error types used throughout the card OCR service.
//! `AppError` covers startup and configuration failures, `RequestError`
//! covers everything that is turned into an HTTP error response.

use std::fmt;

use hyper::StatusCode;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors
    Validation(String),
    /// OCR processing errors
    Ocr(String),
    /// Network/communication errors
    Network(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::ocr_errors::OcrError> for AppError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AppError::Ocr(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced to API clients as `{"detail": "..."}` responses
///
/// None of these are retried by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Missing or wrong bearer token
    Unauthorized,
    /// Uploaded part is not an `image/*`
    InvalidContentType,
    /// No `file` field in the form
    MissingFile,
    /// Body is not a readable multipart form
    MalformedUpload(String),
    /// Body exceeds the configured upload limit
    PayloadTooLarge,
    /// Uploaded bytes are not a decodable image
    ImageDecode(String),
    /// Tesseract failed, timed out or is unavailable
    Engine(String),
    NotFound,
    MethodNotAllowed,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized => StatusCode::UNAUTHORIZED,
            RequestError::InvalidContentType => StatusCode::BAD_REQUEST,
            RequestError::MissingFile | RequestError::MalformedUpload(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RequestError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::ImageDecode(_) | RequestError::Engine(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Client-facing message. Internal causes stay in the logs.
    pub fn detail(&self) -> &'static str {
        match self {
            RequestError::Unauthorized => "Invalid or missing authentication token",
            RequestError::InvalidContentType => "Please upload an image file.",
            RequestError::MissingFile => "Field 'file' is required",
            RequestError::MalformedUpload(_) => "Request body is not a valid multipart form",
            RequestError::PayloadTooLarge => "Uploaded file is too large",
            RequestError::ImageDecode(_) => "Failed to parse image",
            RequestError::Engine(_) => "Error occurred during OCR processing",
            RequestError::NotFound => "Not Found",
            RequestError::MethodNotAllowed => "Method Not Allowed",
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Unauthorized => "auth",
            RequestError::InvalidContentType => "invalid_input",
            RequestError::MissingFile => "missing_file",
            RequestError::MalformedUpload(_) => "malformed_upload",
            RequestError::PayloadTooLarge => "payload_too_large",
            RequestError::ImageDecode(_) => "decode_failure",
            RequestError::Engine(_) => "engine_failure",
            RequestError::NotFound => "not_found",
            RequestError::MethodNotAllowed => "method_not_allowed",
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MalformedUpload(cause)
            | RequestError::ImageDecode(cause)
            | RequestError::Engine(cause) => {
                write!(f, "[{}] {}: {}", self.kind().to_uppercase(), self.detail(), cause)
            }
            _ => write!(f, "[{}] {}", self.kind().to_uppercase(), self.detail()),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<crate::ocr_errors::OcrError> for RequestError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        use crate::ocr_errors::OcrError;
        match err {
            OcrError::ImageDecode(msg) => RequestError::ImageDecode(msg),
            other => RequestError::Engine(other.to_string()),
        }
    }
}

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log OCR processing errors with image and processing context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_size: Option<u64>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_size_bytes = ?image_size,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "OCR processing failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Network operation failed"
        );
    }

    /// Log request errors with the HTTP status they map to
    pub fn log_request_error(error: &super::RequestError, method: &str, path: &str) {
        if error.status().is_server_error() {
            error!(
                error = %error,
                kind = error.kind(),
                status = error.status().as_u16(),
                method = %method,
                path = %path,
                "Request failed"
            );
        } else {
            tracing::warn!(
                error = %error,
                kind = error.kind(),
                status = error.status().as_u16(),
                method = %method,
                path = %path,
                "Request rejected"
            );
        }
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr_errors::OcrError;

    #[test]
    fn test_request_error_status_mapping() {
        assert_eq!(RequestError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RequestError::InvalidContentType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RequestError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            RequestError::ImageDecode("bad".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RequestError::Engine("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ocr_error_conversion() {
        let decode: RequestError = OcrError::ImageDecode("not a png".to_string()).into();
        assert_eq!(decode, RequestError::ImageDecode("not a png".to_string()));

        let timeout: RequestError = OcrError::Timeout("30s".to_string()).into();
        assert!(matches!(timeout, RequestError::Engine(_)));
    }

    #[test]
    fn test_detail_hides_internal_cause() {
        let err = RequestError::Engine("tesseract segfault details".to_string());
        assert!(!err.detail().contains("segfault"));
        assert!(err.to_string().contains("segfault"));
    }

    #[test]
    fn test_app_error_display() {
        assert_eq!(AppError::Config("x".to_string()).to_string(), "[CONFIG] x");
        let from_anyhow: AppError = anyhow::anyhow!("oops").into();
        assert_eq!(from_anyhow, AppError::Internal("oops".to_string()));
    }
}
