//! Response envelope shared by every Librarian endpoint.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// JSON wrapper returned by the backend regardless of HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Pagination block attached to list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }
}

impl<T> Envelope<T> {
    /// Failure envelope for an error response that carried no envelope.
    pub fn failure(error: Option<String>, message: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message,
            error,
            pagination: None,
        }
    }
}

impl Envelope<Value> {
    /// Decode `data` into a concrete type, keeping the rest of the envelope.
    ///
    /// A null or absent payload decodes to `None` rather than failing, so
    /// failure envelopes always convert.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Envelope<T>, serde_json::Error> {
        let data = match self.data {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value)?),
        };
        Ok(Envelope {
            success: self.success,
            data,
            message: self.message,
            error: self.error,
            pagination: self.pagination,
        })
    }

    /// Parse a response body into an envelope.
    ///
    /// Successful statuses must carry a well-formed envelope. Error statuses
    /// are normalized: a missing envelope becomes a failure envelope, and a
    /// bare JSON object keeps whatever `error`/`message` strings it has.
    pub(crate) fn from_body(status: StatusCode, body: &[u8]) -> Result<Self, ApiError> {
        if let Ok(envelope) = serde_json::from_slice::<Envelope<Value>>(body) {
            return Ok(envelope);
        }
        if status.is_success() {
            // 204 No Content and friends
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Envelope {
                    success: true,
                    data: None,
                    message: None,
                    error: None,
                    pagination: None,
                });
            }
            return Err(ApiError::invalid_body(status, body));
        }

        let fields = serde_json::from_slice::<Value>(body).ok();
        let field = |name: &str| {
            fields
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Ok(Envelope::failure(field("error"), field("message")))
    }
}

/// Normalized result of a call that produced a well-formed response.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub envelope: Envelope<T>,
}

impl<T> ApiResponse<T> {
    /// The envelope's success flag. HTTP status alone is not authoritative.
    pub fn is_success(&self) -> bool {
        self.envelope.success
    }

    pub fn data(&self) -> Option<&T> {
        self.envelope.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.envelope.data
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.envelope.pagination.as_ref()
    }

    /// Human-readable error for a failed call, `None` on success.
    ///
    /// Prefers the envelope's error string, then its message, then a generic
    /// message for the HTTP status.
    pub fn error_message(&self) -> Option<String> {
        if self.envelope.success {
            return None;
        }
        self.envelope
            .error
            .clone()
            .or_else(|| self.envelope.message.clone())
            .or_else(|| Some(status_message(self.status).to_string()))
    }
}

impl ApiResponse<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        let status = self.status;
        let envelope = self.envelope.decode().map_err(|e| {
            ApiError::InvalidResponse(format!("Unexpected data shape (status {}): {}", status, e))
        })?;
        Ok(ApiResponse { status, envelope })
    }
}

/// Generic, non-technical message for an HTTP status.
pub fn status_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "The request was invalid. Please check your input.",
        401 => "Your session has expired. Please log in again.",
        403 => "You do not have permission to do that.",
        404 => "The requested item could not be found.",
        409 => "This conflicts with existing data.",
        422 => "Some of the information provided is invalid.",
        429 => "Too many requests. Please wait a moment and try again.",
        500..=599 => "The server encountered an error. Please try again later.",
        _ => "Something went wrong. Please try again.",
    }
}
