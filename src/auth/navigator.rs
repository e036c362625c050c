//! Hook for sending the user back to the login view.
//!
//! A browser client does this with a hard navigation that abandons every
//! pending promise. Here the embedding application decides what "the login
//! view" is; the library only reports that it is time to go there.

use std::sync::Arc;
use tracing::{info, warn};

/// Why the client is leaving the authenticated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRedirect {
    /// The user asked to log out.
    Logout,
    /// The refresh exchange failed; the session is gone.
    SessionExpired,
}

impl std::fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logout => write!(f, "logout"),
            Self::SessionExpired => write!(f, "session expired"),
        }
    }
}

/// Receives "go to the login view" requests.
///
/// Called after the token store has been cleared, never before.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, reason: LoginRedirect);
}

impl<T: Navigator + ?Sized> Navigator for Arc<T> {
    fn redirect_to_login(&self, reason: LoginRedirect) {
        (**self).redirect_to_login(reason)
    }
}

/// Default navigator: only logs. Suitable for headless tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect_to_login(&self, reason: LoginRedirect) {
        match reason {
            LoginRedirect::Logout => info!(%reason, "Signed out, login required"),
            LoginRedirect::SessionExpired => warn!(%reason, "Session ended, login required"),
        }
    }
}

type RedirectFn = dyn Fn(LoginRedirect) + Send + Sync;

/// Navigator backed by a user-provided closure.
pub struct CallbackNavigator {
    redirect_fn: Arc<RedirectFn>,
}

impl CallbackNavigator {
    pub fn new<F>(redirect: F) -> Self
    where
        F: Fn(LoginRedirect) + Send + Sync + 'static,
    {
        Self {
            redirect_fn: Arc::new(redirect),
        }
    }
}

impl Navigator for CallbackNavigator {
    fn redirect_to_login(&self, reason: LoginRedirect) {
        (self.redirect_fn)(reason)
    }
}

impl std::fmt::Debug for CallbackNavigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackNavigator").finish_non_exhaustive()
    }
}
