//! In-memory session storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::SessionStorage;
use crate::error::Result;
use crate::models::Session;

/// In-memory session storage.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the token store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage holding an initial session for a profile.
    pub fn with_session(profile: impl Into<String>, session: Session) -> Self {
        let mut map = HashMap::new();
        map.insert(profile.into(), session);
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self, profile: &str) -> Result<Option<Session>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(profile).cloned())
    }

    fn save(&self, profile: &str, session: &Session) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(profile.to_string(), session.clone());
        Ok(())
    }

    fn remove(&self, profile: &str) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(profile);
        Ok(())
    }

    fn exists(&self, profile: &str) -> Result<bool> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.contains_key(profile))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
