//! Outbound sync switch
//!
//! A one-byte flag file decides whether actions may call Lightspeed. It is
//! read fresh on every request so operators can flip it without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SyncFlag {
    path: PathBuf,
}

impl SyncFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Current flag value. A missing file is created enabled; unreadable
    /// files count as enabled.
    pub async fn is_enabled(&self) -> bool {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content.trim() == "1",
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Err(write_err) = tokio::fs::write(&self.path, "1").await {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %write_err,
                        "Cannot create sync flag file, defaulting to enabled"
                    );
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Cannot read sync flag file, defaulting to enabled"
                );
                true
            }
        }
    }

    /// Persist a new flag value
    pub async fn set_enabled(&self, enabled: bool) -> AppResult<()> {
        tokio::fs::write(&self.path, if enabled { "1" } else { "0" })
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to write sync flag file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        tracing::info!(enabled, path = %self.path.display(), "Sync flag updated");
        Ok(())
    }
}
