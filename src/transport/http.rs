//! Low-level HTTP plumbing shared by the request executor and the refresh
//! coordinator: URL resolution, header attachment, response decoding, and
//! error-body extraction. No auth recovery happens at this layer.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, ClientConfig};
use crate::error::{Error, Result};
use crate::models::wire::ErrorBody;
use crate::transport::headers;

/// HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    user_agent: String,
}

impl HttpTransport {
    /// Build a transport from configuration.
    ///
    /// The underlying client keeps a cookie store, which is the secondary
    /// credential channel next to the bearer header.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = Self::build_client(&config.api)?;
        Ok(Self::with_client(
            client,
            config.base_url()?,
            config.api.user_agent.clone(),
        ))
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: Url, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            user_agent: user_agent.into(),
        }
    }

    pub(crate) fn build_client(api: &ApiConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(api.connect_timeout())
            .timeout(api.request_timeout())
            .build()
            .map_err(Error::Network)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path against the base URL, keeping the base's path prefix.
    ///
    /// Paths that would leave the API origin are rejected so the bearer token
    /// is never sent elsewhere.
    pub fn url(&self, path: &str) -> Result<Url> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid request path '{}': {}", path, e)))?;
        if url.origin() != self.base_url.origin() {
            return Err(Error::Config(format!(
                "Request path '{}' escapes the API origin",
                path
            )));
        }
        Ok(url)
    }

    /// Send one request and return the raw response, whatever its status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self.url(path)?;
        debug!(%method, path, authenticated = bearer.is_some(), "Sending API request");

        let mut request = self
            .client
            .request(method, url)
            .headers(headers::api_headers(bearer, &self.user_agent)?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Error::from_transport)?;
        debug!(path, status = response.status().as_u16(), "API response");
        Ok(response)
    }

    /// Parse a successful response body. An empty body decodes as JSON `null`.
    pub async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = response.bytes().await.map_err(Error::from_transport)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Turn a non-success response into [`Error::Api`].
    pub async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Error::Api {
            status: status.as_u16(),
            message: error_message(status, &text),
        }
    }
}

/// `error` or `message` from a JSON error body, else the status text.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}
