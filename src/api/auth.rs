//! Bearer token shared by every request.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Process-wide authentication state.
///
/// The token is optionally persisted to a file so it survives between runs.
/// [`AuthContext::clear`] is the single invalidation point, called by the
/// client whenever the service answers `401`.
#[derive(Debug, Default)]
pub struct AuthContext {
    /// Where the token is persisted, if anywhere.
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

impl AuthContext {
    /// Context that never touches the filesystem.
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            token: RwLock::new(token),
        }
    }

    /// Load a persisted token; a missing file means "logged out".
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let token = match fs_err::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e).context("Failed to read stored token"),
        };

        tracing::debug!(path = %path.display(), logged_in = token.is_some(), "loaded auth token");

        Ok(Self {
            path: Some(path),
            token: RwLock::new(token),
        })
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Store a fresh token and persist it.
    pub fn set(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs_err::create_dir_all(parent)?;
                }
            }
            fs_err::write(path, &token).context("Failed to persist token")?;
        }

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    /// Forget the token, in memory and on disk.
    pub fn clear(&self) {
        let had_token = self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();

        if let Some(path) = &self.path {
            if let Err(e) = fs_err::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to remove stored token: {}", e);
                }
            }
        }

        if had_token {
            tracing::info!("Cleared authentication token");
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
