//! Request executor: every API call goes through here.
//!
//! Reads the access token from the store synchronously, sends the request,
//! and on a 401 decides between rejecting and asking the refresh coordinator
//! for a new token before replaying.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::refresh::RefreshCoordinator;
use crate::auth::token_store::TokenStore;
use crate::config::NON_RECOVERABLE_PATHS;
use crate::error::{Error, Result};
use crate::transport::HttpTransport;

pub struct RequestExecutor {
    transport: Arc<HttpTransport>,
    store: Arc<TokenStore>,
    refresh: Arc<RefreshCoordinator>,
    max_auth_replays: u32,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<HttpTransport>,
        store: Arc<TokenStore>,
        refresh: Arc<RefreshCoordinator>,
        max_auth_replays: u32,
    ) -> Self {
        Self {
            transport,
            store,
            refresh,
            max_auth_replays,
        }
    }

    /// Send `method path` with an optional JSON body and decode the 2xx body as `T`.
    ///
    /// 401 handling:
    /// - auth endpoints (login, refresh, logout) fail with [`Error::Api`] as is
    /// - a call that carried no token fails with [`Error::NotAuthenticated`]
    /// - otherwise the refresh coordinator runs and the request is replayed,
    ///   up to `max_auth_replays` times, after which [`Error::ReplayRejected`]
    ///
    /// Any other non-success status fails with [`Error::Api`] and is never retried.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut replays = 0u32;

        loop {
            let token = self.store.access_token();
            let response = self
                .transport
                .send(method.clone(), path, body.as_ref(), token.as_deref())
                .await?;

            let status = response.status();
            if status.is_success() {
                return HttpTransport::decode(response).await;
            }
            if status != StatusCode::UNAUTHORIZED || is_non_recoverable(path) {
                return Err(HttpTransport::error_from_response(response).await);
            }

            let Some(token) = token else {
                debug!(path, "401 on anonymous request");
                return Err(Error::NotAuthenticated);
            };

            if replays >= self.max_auth_replays {
                warn!(path, replays, "401 after token refresh, giving up");
                return Err(Error::ReplayRejected {
                    path: path.to_string(),
                    replays,
                });
            }

            self.refresh.refresh(&token).await?;
            replays += 1;
            debug!(path, replays, "Replaying request with refreshed token");
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.transport.base_url().as_str())
            .field("max_auth_replays", &self.max_auth_replays)
            .finish()
    }
}

/// Whether a 401 on `path` must never start a refresh.
pub fn is_non_recoverable(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_matches('/');
    NON_RECOVERABLE_PATHS
        .iter()
        .any(|p| p.trim_matches('/') == path)
}
