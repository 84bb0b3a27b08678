//! Shared response types, plus re-exported types from external crates for convenience.
//!
//! The re-exports are commonly used in this SDK so users don't need to add these dependencies to
//! their `Cargo.toml`.

/// Date and time types for token acquisition stamps, error timestamps and date-range filters.
pub use chrono::{DateTime, NaiveDate, Utc};
/// Secret string type that redacts tokens and passwords in debug output.
pub use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, serde_helpers};

/// Raw outcome of a successful call, left undecoded so that each endpoint can pick its own
/// response shape.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    /// The response body as returned by the API.
    pub body: String,
    /// Value of the `x-request-id` response header.
    pub request_id: Option<String>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(body: String, request_id: Option<String>) -> Self {
        Self { body, request_id }
    }

    /// Decodes the body into `T`.
    ///
    /// Malformed JSON and shape mismatches both surface as [`crate::error::Kind::Decode`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let value: Value = serde_json::from_str(&self.body)?;
        serde_helpers::deserialize_with_warnings(value)
    }
}

/// Error envelope describing a failed call.
///
/// The API returns this shape for its own failures; the SDK also synthesizes one for every
/// non-successful status, see [`crate::error::Status::error_response`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub request_id: String,
    pub path: String,
    pub http_code: u16,
    pub http_phrase: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub path: String,
    pub message: String,
}
