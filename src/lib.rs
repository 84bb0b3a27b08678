#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod client;
pub mod error;
pub mod query;
pub mod quota;
pub(crate) mod serde_helpers;
pub mod types;

use chrono::Utc;
use reqwest::Request;
use reqwest::header::HeaderMap;
use url::Url;

pub use crate::client::{Client, Config};
use crate::error::{Error, Status};
use crate::types::ApiResponse;

pub type Result<T> = std::result::Result<T, Error>;

/// Header carrying the server-side identifier of a call, echoed back in error envelopes.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Appends `path` (which may carry a query string) to `base`, keeping any path prefix of `base`.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{}{path}",
        base.as_str().trim_end_matches('/')
    ))?)
}

/// Appends each of `segments` to `base` as a single percent-encoded path segment, followed by
/// `query`, which is either empty or starts with `?`.
pub(crate) fn endpoint_segments(base: &Url, segments: &[&str], query: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::validation(format!("not a base URL: {base}")))?
        .pop_if_empty()
        .extend(segments);
    url.set_query(query.strip_prefix('?'));

    Ok(url)
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Executes a fully built request and maps any status of 400 or above to a [`Status`] error.
///
/// The body of a successful response is returned as text so that callers can pick a shape.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "debug",
        skip(client, request),
        fields(
            method = %request.method(),
            path = request.url().path(),
            status_code
        )
    )
)]
pub(crate) async fn send(client: &reqwest::Client, request: Request) -> Result<ApiResponse> {
    let method = request.method().clone();
    let path = request.url().to_string();

    let response = client.execute(request).await?;
    let status_code = response.status();
    let request_id = request_id(response.headers());

    #[cfg(feature = "tracing")]
    tracing::Span::current().record("status_code", status_code.as_u16());

    if status_code.is_client_error() || status_code.is_server_error() {
        let body = response.text().await.unwrap_or_default();

        #[cfg(feature = "tracing")]
        tracing::warn!(
            status = %status_code,
            method = %method,
            path = %path,
            request_id = ?request_id,
            "API request failed"
        );

        return Err(Status {
            status_code,
            method,
            path,
            request_id,
            timestamp: Utc::now(),
            body,
        }
        .into());
    }

    let body = response.text().await?;

    Ok(ApiResponse::new(body, request_id))
}
