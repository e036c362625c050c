//! Header construction for dashboard API requests.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Per-request correlation id, echoed in server logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the headers for one API request.
///
/// The bearer header is attached only when `access_token` is present;
/// anonymous calls still carry cookies through the client's cookie store.
/// A token or user agent that cannot be sent as a header value is an error.
pub fn api_headers(access_token: Option<&str>, user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(token) = access_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            Error::Storage("stored access token is not a valid header value".into())
        })?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }

    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json"),
    );

    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|_| Error::Config(format!("invalid user agent: {user_agent:?}")))?,
    );

    headers.insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap_or_else(|_| {
            HeaderValue::from_static("00000000-0000-0000-0000-000000000000")
        }),
    );

    Ok(headers)
}
