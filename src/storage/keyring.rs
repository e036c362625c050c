//! Keyring-based session storage.

use tracing::instrument;

use super::SessionStorage;
use crate::error::{Error, Result};
use crate::models::Session;

/// Session storage in the system's native credential store.
///
/// Sessions are serialized to JSON and stored under `(service, profile)`.
#[derive(Debug, Clone)]
pub struct KeyringSessionStorage {
    service: String,
}

impl Default for KeyringSessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringSessionStorage {
    const SERVICE_NAME: &str = "dash-api";

    pub fn new() -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
        }
    }

    /// Use a custom keyring service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Check if the system keyring is reachable.
    pub fn is_available() -> bool {
        match keyring::Entry::new("dash-api-availability", "availability-check") {
            Ok(entry) => match entry.get_password() {
                Ok(_) | Err(keyring::Error::NoEntry) => true,
                Err(keyring::Error::NoStorageAccess(_)) | Err(keyring::Error::PlatformFailure(_)) => {
                    false
                }
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    fn entry(&self, profile: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, profile)
            .map_err(|e| Error::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

impl SessionStorage for KeyringSessionStorage {
    #[instrument(skip(self))]
    fn load(&self, profile: &str) -> Result<Option<Session>> {
        match self.entry(profile)?.get_password() {
            Ok(json) => {
                let session = serde_json::from_str(&json).map_err(|e| {
                    Error::Storage(format!("Failed to parse session from keyring: {}", e))
                })?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, session))]
    fn save(&self, profile: &str, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)
            .map_err(|e| Error::Storage(format!("Failed to serialize session: {}", e)))?;
        self.entry(profile)?
            .set_password(&json)
            .map_err(|e| Error::Storage(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self))]
    fn remove(&self, profile: &str) -> Result<()> {
        match self.entry(profile)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
