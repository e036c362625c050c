//! Token store: the single source of truth for client credentials.
//!
//! Reads are synchronous so the request executor can attach the bearer header
//! without awaiting. Every write updates the in-memory view and persists it
//! to the [`SessionStorage`] backend under the same lock, so the persisted
//! record never lags behind a later write. Persistence failures are logged and
//! never undo the in-memory change.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::models::{Session, SessionStatus, User};
use crate::storage::{MemorySessionStorage, SessionStorage};

pub struct TokenStore {
    session: RwLock<Option<Session>>,
    storage: Arc<dyn SessionStorage>,
    profile: String,
}

impl TokenStore {
    /// Open the store for `profile`, seeding it from whatever `storage` holds.
    ///
    /// An unreadable record is logged and treated as signed out.
    pub fn open(storage: Arc<dyn SessionStorage>, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        let session = match storage.load(&profile) {
            Ok(session) => session,
            Err(e) => {
                warn!(%profile, backend = storage.name(), error = %e, "Failed to load stored session");
                None
            }
        };
        debug!(%profile, restored = session.is_some(), "Token store opened");
        Self {
            session: RwLock::new(session),
            storage,
            profile,
        }
    }

    /// Store backed by fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemorySessionStorage::new()), "default")
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn access_token(&self) -> Option<String> {
        self.read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<User> {
        self.read().as_ref().and_then(|s| s.user.clone())
    }

    pub fn organization_id(&self) -> Option<String> {
        self.read().as_ref().and_then(|s| s.organization_id.clone())
    }

    /// Copy of the whole session.
    pub fn snapshot(&self) -> Option<Session> {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_session(self.read().as_ref())
    }

    /// Replace the whole session (login).
    pub fn set_session(&self, session: Session) {
        let mut guard = self.write();
        *guard = Some(session);
        self.persist(&guard);
    }

    /// Rotate the token pair in place. Only the refresh coordinator calls this.
    ///
    /// The write happens only while the stored refresh token is still
    /// `expected_refresh`, the one the exchange was made with. Returns `false`
    /// without writing when the session was cleared or replaced meanwhile, so
    /// a refresh that settles after logout or a new login cannot overwrite it.
    pub(crate) fn rotate_tokens(
        &self,
        expected_refresh: &str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> bool {
        let mut guard = self.write();
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if session.refresh_token.as_deref() != Some(expected_refresh) {
            debug!(profile = %self.profile, "Session replaced during refresh, dropping rotated tokens");
            return false;
        }
        session.rotate(access_token, refresh_token);
        self.persist(&guard);
        true
    }

    /// Cache the current user. Its organization id, when present, replaces
    /// the cached one. Ignored when signed out.
    pub fn set_user(&self, user: User) {
        let mut guard = self.write();
        let Some(session) = guard.as_mut() else {
            return;
        };
        if user.organization_id.is_some() {
            session.organization_id = user.organization_id.clone();
        }
        session.user = Some(user);
        self.persist(&guard);
    }

    /// Select the organization the dashboard works against. Ignored when signed out.
    pub fn set_organization_id(&self, organization_id: Option<String>) {
        let mut guard = self.write();
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.organization_id = organization_id;
        self.persist(&guard);
    }

    /// Drop tokens, user, and organization id together. Never fails.
    pub fn clear(&self) {
        let mut guard = self.write();
        self.clear_locked(&mut guard);
    }

    /// Clear only if the stored refresh token is still `expected_refresh`.
    ///
    /// Returns `false` when the store is already empty or now holds a
    /// different session.
    pub(crate) fn clear_if_current(&self, expected_refresh: Option<&str>) -> bool {
        let mut guard = self.write();
        let current = match guard.as_ref() {
            Some(session) => session.refresh_token.as_deref().filter(|t| !t.is_empty()),
            None => return false,
        };
        if current != expected_refresh {
            return false;
        }
        self.clear_locked(&mut guard);
        true
    }

    fn clear_locked(&self, guard: &mut RwLockWriteGuard<'_, Option<Session>>) {
        **guard = None;
        if let Err(e) = self.storage.remove(&self.profile) {
            warn!(profile = %self.profile, backend = self.storage.name(), error = %e, "Failed to remove stored session");
        }
        debug!(profile = %self.profile, "Token store cleared");
    }

    fn persist(&self, guard: &RwLockWriteGuard<'_, Option<Session>>) {
        let result = match guard.as_ref() {
            Some(session) => self.storage.save(&self.profile, session),
            None => self.storage.remove(&self.profile),
        };
        if let Err(e) = result {
            warn!(profile = %self.profile, backend = self.storage.name(), error = %e, "Failed to persist session");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("profile", &self.profile)
            .field("backend", &self.storage.name())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
