//! Single-flight refresh coordinator.
//!
//! At most one `POST /auth/refresh` is outstanding at any time. The first
//! caller to report a 401 while the gate is idle becomes the leader and runs
//! the exchange; everyone arriving while it runs parks on a oneshot channel and
//! is released together once the token store reflects the outcome.
//!
//! ```text
//!            401 (idle, token current)          exchange ok
//!   Idle ─────────────────────────────▶ Refreshing ──────────▶ Idle (replay all)
//!                                           │
//!                                           │ exchange failed
//!                                           ▼
//!                          clear store, redirect to login, Idle (all fail)
//! ```
//!
//! The gate is a `std::sync::Mutex` that is never held across an `.await`.
//! An exchange only writes to (or clears) the store while it still holds the
//! refresh token that was exchanged; a logout or login in between wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Method;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::navigator::{LoginRedirect, Navigator};
use crate::auth::token_store::TokenStore;
use crate::config::REFRESH_PATH;
use crate::error::{Error, Result};
use crate::models::wire::{RefreshResponse, RefreshTokenBody};
use crate::transport::HttpTransport;

/// What a settled refresh cycle tells the callers that asked for it.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// The store holds a fresh token; replay.
    Refreshed,
    /// The session is gone; the navigator has been told.
    Expired(String),
    /// The leader was dropped before the exchange settled.
    Abandoned,
}

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Why an exchange did not produce a usable token.
enum ExchangeFailure {
    /// The auth service (or the network) said no.
    Rejected(String),
    /// Logout or a new login replaced the session while the exchange was in
    /// flight.
    SessionGone,
}

pub struct RefreshCoordinator {
    transport: Arc<HttpTransport>,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<RefreshState>,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<HttpTransport>,
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            transport,
            store,
            navigator,
            state: Mutex::new(RefreshState::Idle),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Recover from a 401 received while `stale_token` was attached.
    ///
    /// Returns `Ok(())` once the caller should replay its request with the
    /// currently stored token. Returns [`Error::SessionExpired`] when the
    /// refresh failed; by then the store is empty and the navigator has been
    /// sent to the login view.
    pub async fn refresh(&self, stale_token: &str) -> Result<()> {
        loop {
            let waiter = {
                let mut state = self.lock();
                match &mut *state {
                    RefreshState::Refreshing { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        debug!(queued = waiters.len(), "Refresh in flight, waiting");
                        Some(rx)
                    }
                    RefreshState::Idle => {
                        match self.store.access_token() {
                            None => return Err(Error::NotAuthenticated),
                            Some(current) if current != stale_token => {
                                debug!("Access token already rotated, replaying");
                                return Ok(());
                            }
                            Some(_) => {}
                        }
                        *state = RefreshState::Refreshing {
                            waiters: Vec::new(),
                        };
                        None
                    }
                }
            };

            let outcome = match waiter {
                Some(rx) => rx.await.unwrap_or(RefreshOutcome::Abandoned),
                None => self.lead().await,
            };

            match outcome {
                RefreshOutcome::Refreshed => return Ok(()),
                RefreshOutcome::Expired(reason) => return Err(Error::SessionExpired(reason)),
                RefreshOutcome::Abandoned => {
                    debug!("Refresh leader went away, retrying");
                }
            }
        }
    }

    /// Number of refresh exchanges sent so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    async fn lead(&self) -> RefreshOutcome {
        let guard = LeaderGuard {
            coordinator: self,
            armed: true,
        };

        let refresh_token = self.store.refresh_token();
        let outcome = match self.exchange(refresh_token.as_deref()).await {
            Ok(()) => {
                info!("Access token refreshed");
                RefreshOutcome::Refreshed
            }
            Err(ExchangeFailure::SessionGone) => session_gone(),
            Err(ExchangeFailure::Rejected(reason)) => {
                if self.store.clear_if_current(refresh_token.as_deref()) {
                    warn!(%reason, "Token refresh failed, ending session");
                    self.navigator.redirect_to_login(LoginRedirect::SessionExpired);
                    RefreshOutcome::Expired(reason)
                } else {
                    session_gone()
                }
            }
        };

        guard.settle(outcome.clone());
        outcome
    }

    /// Trade `refresh_token` for a new pair and rotate it into the store.
    async fn exchange(
        &self,
        refresh_token: Option<&str>,
    ) -> std::result::Result<(), ExchangeFailure> {
        let refresh_token = refresh_token
            .ok_or_else(|| ExchangeFailure::Rejected("no refresh token stored".into()))?;

        let body = serde_json::to_value(RefreshTokenBody {
            refresh_token: Some(refresh_token),
        })
        .map_err(|e| ExchangeFailure::Rejected(e.to_string()))?;

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        debug!("Exchanging refresh token");

        let response = self
            .transport
            .send(Method::POST, REFRESH_PATH, Some(&body), None)
            .await
            .map_err(|e| ExchangeFailure::Rejected(e.to_string()))?;

        if !response.status().is_success() {
            let err = HttpTransport::error_from_response(response).await;
            return Err(ExchangeFailure::Rejected(err.to_string()));
        }

        let parsed: RefreshResponse = HttpTransport::decode(response)
            .await
            .map_err(|e| ExchangeFailure::Rejected(e.to_string()))?;
        if parsed.token.is_empty() {
            return Err(ExchangeFailure::Rejected(
                "refresh response carried an empty token".into(),
            ));
        }

        if self
            .store
            .rotate_tokens(refresh_token, parsed.token, parsed.refresh_token)
        {
            Ok(())
        } else {
            Err(ExchangeFailure::SessionGone)
        }
    }

    /// Return to `Idle` and hand `outcome` to every waiter.
    fn release(&self, outcome: RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Releasing refresh waiters");
        }
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("exchanges", &self.exchanges())
            .finish()
    }
}

/// Outcome for an exchange that settled after the session it served ended.
/// The store and navigator belong to whoever ended it.
fn session_gone() -> RefreshOutcome {
    debug!("Session ended during refresh, discarding result");
    RefreshOutcome::Expired("session ended during refresh".into())
}

/// Releases waiters as abandoned if the leader future is dropped mid-exchange.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl LeaderGuard<'_> {
    fn settle(mut self, outcome: RefreshOutcome) {
        self.armed = false;
        self.coordinator.release(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Refresh leader dropped before settling");
            self.coordinator.release(RefreshOutcome::Abandoned);
        }
    }
}
