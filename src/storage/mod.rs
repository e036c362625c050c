//! Session storage backends for persisting credentials across restarts.
//!
//! Provides the [`SessionStorage`] trait and implementations:
//! - [`FileSessionStorage`] - One JSON file per profile with 0600 permissions
//! - [`MemorySessionStorage`] - In-memory (testing, ephemeral sessions)
//! - [`KeyringSessionStorage`] - System keyring (requires `system-keyring` feature)
//!
//! All operations are synchronous so the token store can read credentials
//! without awaiting. Each profile's session is one record, so clearing it is a
//! single `remove`.

mod file;
mod memory;

#[cfg(feature = "system-keyring")]
mod keyring;

use std::sync::Arc;

pub use file::FileSessionStorage;
pub use memory::MemorySessionStorage;

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringSessionStorage;

use crate::error::Result;
use crate::models::Session;

/// Trait for session storage backends.
///
/// All storage implementations must be thread-safe (`Send + Sync`).
/// Operations take a `profile` parameter so several sign-ins (e.g. against
/// staging and production) can share one backend.
pub trait SessionStorage: Send + Sync {
    /// Load the stored session for a profile, if any.
    fn load(&self, profile: &str) -> Result<Option<Session>>;

    /// Save the session for a profile.
    fn save(&self, profile: &str, session: &Session) -> Result<()>;

    /// Remove the stored session for a profile. Removing nothing is not an error.
    fn remove(&self, profile: &str) -> Result<()>;

    /// Check if a session exists for a profile.
    fn exists(&self, profile: &str) -> Result<bool> {
        Ok(self.load(profile)?.is_some())
    }

    /// Name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    fn load(&self, profile: &str) -> Result<Option<Session>> {
        (**self).load(profile)
    }
    fn save(&self, profile: &str, session: &Session) -> Result<()> {
        (**self).save(profile, session)
    }
    fn remove(&self, profile: &str) -> Result<()> {
        (**self).remove(profile)
    }
    fn exists(&self, profile: &str) -> Result<bool> {
        (**self).exists(profile)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: SessionStorage + ?Sized> SessionStorage for Box<T> {
    fn load(&self, profile: &str) -> Result<Option<Session>> {
        (**self).load(profile)
    }
    fn save(&self, profile: &str, session: &Session) -> Result<()> {
        (**self).save(profile, session)
    }
    fn remove(&self, profile: &str) -> Result<()> {
        (**self).remove(profile)
    }
    fn exists(&self, profile: &str) -> Result<bool> {
        (**self).exists(profile)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
