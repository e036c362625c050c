//! Login, logout, and app-start rehydration.

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, info};

use crate::auth::navigator::{LoginRedirect, Navigator};
use crate::auth::token_store::TokenStore;
use crate::config::{LOGIN_PATH, LOGOUT_PATH, ME_PATH};
use crate::error::Result;
use crate::models::wire::{LoginRequest, LoginResponse, MeResponse, RefreshTokenBody};
use crate::models::{Session, SessionStatus, User};
use crate::transport::RequestExecutor;

/// Entry points that seed or clear the token store.
pub struct SessionController {
    executor: Arc<RequestExecutor>,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl SessionController {
    pub fn new(
        executor: Arc<RequestExecutor>,
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            executor,
            store,
            navigator,
        }
    }

    /// Sign in and store the returned token pair and user.
    ///
    /// Does not navigate anywhere; the caller decides what comes next. A
    /// rejected login surfaces the server's message as [`Error::Api`].
    ///
    /// [`Error::Api`]: crate::error::Error::Api
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        let body = serde_json::to_value(LoginRequest { username, password })?;
        let response: LoginResponse = self
            .executor
            .execute(Method::POST, LOGIN_PATH, Some(body))
            .await?;

        let session = Session::new(response.token, response.refresh_token, response.user);
        let user = session.user.clone();
        self.store.set_session(session);

        info!(username, "Logged in");
        Ok(user)
    }

    /// Sign out. Never fails and is safe to call repeatedly.
    ///
    /// The server is notified on a best-effort basis and its answer ignored;
    /// the store is then cleared and the navigator sent to the login view.
    pub async fn logout(&self) {
        let refresh_token = self.store.refresh_token();
        match serde_json::to_value(RefreshTokenBody {
            refresh_token: refresh_token.as_deref(),
        }) {
            Ok(body) => {
                if let Err(e) = self
                    .executor
                    .execute::<serde_json::Value>(Method::POST, LOGOUT_PATH, Some(body))
                    .await
                {
                    debug!(error = %e, "Server-side logout failed, ignoring");
                }
            }
            Err(e) => debug!(error = %e, "Could not encode logout body, skipping server call"),
        }

        self.store.clear();
        info!("Logged out");
        self.navigator.redirect_to_login(LoginRedirect::Logout);
    }

    /// Restore the cached user on app start.
    ///
    /// Returns `Ok(None)` without a network call when no token is stored. An
    /// expired token goes through the normal refresh cycle.
    pub async fn rehydrate(&self) -> Result<Option<User>> {
        if !self.store.is_authenticated() {
            debug!("No stored session to rehydrate");
            return Ok(None);
        }

        let user = self
            .executor
            .execute::<MeResponse>(Method::GET, ME_PATH, None)
            .await?
            .into_user();
        self.store.set_user(user.clone());

        info!(username = %user.username, "Session rehydrated");
        Ok(Some(user))
    }

    pub fn status(&self) -> SessionStatus {
        self.store.status()
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
