use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
/// HTTP method type, re-exported for use with error inspection.
pub use reqwest::Method;
/// HTTP status code type, re-exported for use with error inspection.
pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::types::{ErrorDetail, ErrorResponse};

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error related to non-successful HTTP call
    Status,
    /// Structural or local failure detected before anything is sent
    Validation,
    /// Both tokens expired and re-authentication from credentials did not succeed
    SessionExpired,
    /// A password grant or refresh exchange failed
    Authentication,
    /// Network-level failure with no HTTP response available
    Transport,
    /// A successful response could not be decoded
    Decode,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// Returns the HTTP status carried by this error, if it came from a non-successful call.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.downcast_ref::<Status>().map(|status| status.status_code)
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    #[must_use]
    pub fn session_expired(cause: Option<Error>) -> Self {
        SessionExpired {
            cause: cause.map(Box::new),
        }
        .into()
    }

    #[must_use]
    pub fn authentication(exchange: Exchange, cause: Error) -> Self {
        Authentication {
            exchange,
            cause: Box::new(cause),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A remote call that answered with an HTTP status of 400 or above.
///
/// The raw response body is kept so that callers can decode richer, API-specific error payloads
/// with [`Status::decode_body`].
#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub method: Method,
    /// Requested location, base URL included.
    pub path: String,
    /// Value of the `x-request-id` response header.
    pub request_id: Option<String>,
    /// When the failing response was received.
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

impl Status {
    /// The status phrase, e.g. `401 Unauthorized`.
    #[must_use]
    pub fn phrase(&self) -> String {
        self.status_code.to_string()
    }

    /// Builds the error envelope for this failure with a single synthesized entry whose message
    /// is the status phrase.
    #[must_use]
    pub fn error_response(&self) -> ErrorResponse {
        let phrase = self.phrase();

        ErrorResponse {
            timestamp: Some(self.timestamp),
            request_id: self.request_id.clone().unwrap_or_default(),
            path: self.path.clone(),
            http_code: self.status_code.as_u16(),
            http_phrase: phrase.clone(),
            errors: vec![ErrorDetail {
                path: self.path.clone(),
                message: phrase,
            }],
        }
    }

    /// Attempts to decode the raw response body into an API-specific error payload.
    pub fn decode_body<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error({}) making {} call to {} with {}",
            self.status_code, self.method, self.path, self.body
        )
    }
}

impl StdError for Status {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

/// Both the access and the refresh token are expired.
///
/// When re-authenticating from the stored credentials was attempted and failed, that failure is
/// available through [`StdError::source`].
#[non_exhaustive]
#[derive(Debug)]
pub struct SessionExpired {
    pub cause: Option<Box<Error>>,
}

impl fmt::Display for SessionExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "session expired: {cause}"),
            None => write!(f, "session expired"),
        }
    }
}

impl StdError for SessionExpired {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

/// The token exchange that failed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Exchange {
    #[strum(serialize = "password grant")]
    Password,
    #[strum(serialize = "token refresh")]
    Refresh,
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Authentication {
    pub exchange: Exchange,
    pub cause: Box<Error>,
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.exchange, self.cause)
    }
}

impl StdError for Authentication {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_decode() {
            Kind::Decode
        } else if e.is_builder() {
            Kind::Internal
        } else {
            Kind::Transport
        };

        Error::with_source(kind, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Decode, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<crate::quota::QuotaPlanError> for Error {
    fn from(err: crate::quota::QuotaPlanError) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Status, err)
    }
}

impl From<SessionExpired> for Error {
    fn from(err: SessionExpired) -> Self {
        Error::with_source(Kind::SessionExpired, err)
    }
}

impl From<Authentication> for Error {
    fn from(err: Authentication) -> Self {
        Error::with_source(Kind::Authentication, err)
    }
}
