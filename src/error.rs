use std::error::Error as StdError;
use std::num::TryFromIntError;

use rusoto_cloudwatch::GetMetricStatisticsError;
use rusoto_core::RusotoError;
use rusoto_dynamodb::{DescribeTableError, ListTablesError};
use rusoto_lambda::ListFunctionsError;
use rusoto_s3::ListBucketsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} '{name}' not found")]
    ResourceNotFound { kind: &'static str, name: String },

    #[error("{operation} failed: {message}")]
    BackendUnavailable {
        operation: &'static str,
        message: String,
        transient: bool,
    },

    #[error("Invalid JSON in request body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to encode response: {0}")]
    Encode(String),

    #[error("Value is None")]
    NoneValue,

    #[error("Failed to convert bigDecimal to primitive")]
    ToPrimitive,

    #[error("Failed to convert int")]
    TryFromIntError(#[from] TryFromIntError),
}

impl MetricsApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        MetricsApiError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        MetricsApiError::ResourceNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Wraps a rusoto failure, remembering whether retrying could help.
    pub fn backend<E: StdError + Retryable + 'static>(
        operation: &'static str,
        error: RusotoError<E>,
    ) -> Self {
        let transient = is_transient(&error);
        MetricsApiError::BackendUnavailable {
            operation,
            message: error.to_string(),
            transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetricsApiError::BackendUnavailable {
                transient: true,
                ..
            }
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            MetricsApiError::Validation(_) | MetricsApiError::InvalidJson(_) => 400,
            MetricsApiError::ResourceNotFound { .. } => 404,
            MetricsApiError::BackendUnavailable { .. } => 503,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MetricsApiError::Validation(_) | MetricsApiError::InvalidJson(_) => "VALIDATION_ERROR",
            MetricsApiError::ResourceNotFound { .. } => "NOT_FOUND",
            MetricsApiError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Modelled service errors that mean throttling or a server-side fault.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for GetMetricStatisticsError {
    fn is_retryable(&self) -> bool {
        matches!(self, GetMetricStatisticsError::InternalServiceFault(_))
    }
}

impl Retryable for ListBucketsError {
    fn is_retryable(&self) -> bool {
        false
    }
}

impl Retryable for ListTablesError {
    fn is_retryable(&self) -> bool {
        matches!(self, ListTablesError::InternalServerError(_))
    }
}

impl Retryable for DescribeTableError {
    fn is_retryable(&self) -> bool {
        matches!(self, DescribeTableError::InternalServerError(_))
    }
}

impl Retryable for ListFunctionsError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ListFunctionsError::TooManyRequests(_) | ListFunctionsError::Service(_)
        )
    }
}

fn is_transient<E: Retryable>(error: &RusotoError<E>) -> bool {
    match error {
        RusotoError::HttpDispatch(_) => true,
        RusotoError::Service(error) => error.is_retryable(),
        RusotoError::Unknown(response) => {
            response.status.as_u16() == 429
                || response.status.is_server_error()
                || response.body_as_str().contains("Throttl")
        }
        _ => false,
    }
}
