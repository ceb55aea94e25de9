//! Cookie jar persisted between runs.
//!
//! The file holds a plain JSON array of cookie objects. It is overwritten after
//! every successful login and read back best-effort at the start of a run: a
//! missing or corrupt file simply means there is no prior session.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A browser cookie as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds; negative for session cookies.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: session_expiry(),
            http_only: false,
            secure: false,
        }
    }
}

/// Session cookie file at a fixed path.
#[derive(Debug, Clone)]
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously saved cookies; `None` if the file is missing or unreadable.
    pub fn load(&self) -> Option<Vec<StoredCookie>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "No prior session");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(cookies) => Some(cookies),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Ignoring corrupt session file"
                );
                None
            }
        }
    }

    /// Overwrite the jar with `cookies`.
    pub fn save(&self, cookies: &[StoredCookie]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session dir: {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(cookies).context("Failed to serialize session")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;

        Ok(())
    }
}
