//! Shared parameter store
//!
//! A flat JSON object of live-mix parameters kept on disk so that running
//! Sonic Pi code and later sessions can see the current mix. There is no
//! locking; concurrent writers race and the last write wins.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{MusicboxError, Result, StateError};

/// Current live parameters, keyed by name
pub type SharedState = Map<String, Value>;

/// JSON-file backed parameter store
#[derive(Debug, Clone)]
pub struct SharedStateStore {
    path: PathBuf,
}

impl SharedStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the store; a missing file is an empty store
    pub async fn load(&self) -> Result<SharedState> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SharedState::new()),
            Err(e) => {
                return Err(MusicboxError::State(StateError::ReadFailed {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                }))
            }
        };

        if content.trim().is_empty() {
            return Ok(SharedState::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(MusicboxError::State(StateError::Malformed {
                path: self.path.display().to_string(),
            })),
        }
    }

    /// Replace the store contents, creating parent directories as needed
    pub async fn save(&self, state: &SharedState) -> Result<()> {
        let write_failed = |e: std::io::Error| {
            MusicboxError::State(StateError::WriteFailed {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
            }
        }

        let content = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(write_failed)?;

        tracing::debug!("Saved {} parameters to {}", state.len(), self.path.display());
        Ok(())
    }
}
