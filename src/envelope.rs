use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::MetricsApiError;
use crate::time_range::iso_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// Uniform body of every response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    pub message: String,
    pub data: Value,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl ResponseEnvelope {
    pub fn wrap(status: EnvelopeStatus, message: impl Into<String>, data: Value) -> Self {
        ResponseEnvelope {
            status,
            message: message.into(),
            data,
            timestamp: iso_timestamp(&Utc::now()),
            error_code: None,
        }
    }

    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self::wrap(EnvelopeStatus::Success, message, data)
    }

    /// Error envelope carrying the error's code; `detail` is usually null.
    pub fn wrap_error(message: impl Into<String>, error: &MetricsApiError, detail: Value) -> Self {
        ResponseEnvelope {
            error_code: Some(error.error_code()),
            ..Self::wrap(EnvelopeStatus::Error, message, detail)
        }
    }
}
