//! File-based session storage with secure permissions.

use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::SessionStorage;
use crate::error::{Error, Result};
use crate::models::Session;

/// File permissions for session files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based session storage.
///
/// Stores each profile's session as `{dir}/{profile}.json`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
/// - Writes go to a temp file that is renamed into place
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    /// Create storage rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("{}.json", profile))
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::storage_io(&self.dir, e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            std::fs::set_permissions(&self.dir, perms)
                .map_err(|e| Error::storage_io(&self.dir, format!("chmod: {}", e)))?;
        }
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    #[instrument(skip(self))]
    fn load(&self, profile: &str) -> Result<Option<Session>> {
        let path = self.profile_path(profile);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage_io(&path, e.to_string())),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let session = serde_json::from_str(&content).map_err(|e| {
            Error::Storage(format!("Failed to parse session file '{}': {}", path.display(), e))
        })?;
        Ok(Some(session))
    }

    #[instrument(skip(self, session))]
    fn save(&self, profile: &str, session: &Session) -> Result<()> {
        self.ensure_dir()?;

        let path = self.profile_path(profile);
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Storage(format!("Failed to serialize session: {}", e)))?;
        let temp_path = path.with_extension("tmp");

        // 0600 from creation, so the tokens are never briefly world-readable.
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .map_err(|e| Error::storage_io(&temp_path, e.to_string()))?;
            file.write_all(content.as_bytes())
                .map_err(|e| Error::storage_io(&temp_path, e.to_string()))?;
            file.sync_all()
                .map_err(|e| Error::storage_io(&temp_path, e.to_string()))?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, &content)
                .map_err(|e| Error::storage_io(&temp_path, e.to_string()))?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::storage_io(&path, format!("rename: {}", e)));
        }

        debug!(path = %path.display(), "Session saved");
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, profile: &str) -> Result<()> {
        let path = self.profile_path(profile);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_io(&path, e.to_string())),
        }
    }

    fn exists(&self, profile: &str) -> Result<bool> {
        Ok(self.profile_path(profile).exists())
    }

    fn name(&self) -> &str {
        "file"
    }
}
