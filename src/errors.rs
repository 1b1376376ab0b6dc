use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy for the checkout core.
///
/// Every fallible operation in the crate funnels into one of these variants
/// so the embedding UI can pick presentation (inline message, toast, support
/// banner) from the variant alone.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend could not be reached (network failure, timeout).
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// The backend answered with a non-success status.
    #[error("External API error ({status}): {message}")]
    ExternalApiError { status: u16, message: String },

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Payment was captured but the order could not be persisted. The most
    /// severe failure in the flow: money has moved, so this must never be
    /// presented like an ordinary checkout error.
    #[error("Payment {payment_id} captured but order was not persisted: {message}")]
    OrderNotPersisted { payment_id: String, message: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Whether the same action can reasonably be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ExternalServiceError(_)
                | ServiceError::ExternalApiError { status: 500..=599, .. }
        )
    }

    /// Whether money has already moved when this error surfaced.
    pub fn is_post_payment(&self) -> bool {
        matches!(self, ServiceError::OrderNotPersisted { .. })
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::ExternalServiceError(format!("Request timed out: {}", err))
        } else if let Some(status) = err.status() {
            ServiceError::ExternalApiError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::ConfigError(err.to_string())
    }
}
