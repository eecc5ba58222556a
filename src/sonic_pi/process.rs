//! Sonic Pi application control
//!
//! Detects whether the Sonic Pi application is running and launches it.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{MusicboxError, Result, SonicPiError};

/// How long `pgrep` may take before Sonic Pi is assumed absent
const PGREP_TIMEOUT: Duration = Duration::from_secs(5);

/// Control over the external Sonic Pi application
#[async_trait]
pub trait AppController: Send + Sync {
    /// Whether the application is currently running
    async fn is_running(&self) -> bool;

    /// Start the application without waiting for it to come up
    async fn launch(&self) -> Result<()>;

    /// Where the application is launched from
    fn app_path(&self) -> &std::path::Path;
}

/// Controller backed by `pgrep` and the platform opener
#[derive(Debug, Clone)]
pub struct SystemAppController {
    app_path: PathBuf,
    process_name: String,
}

impl SystemAppController {
    pub fn new(app_path: PathBuf, process_name: impl Into<String>) -> Self {
        Self {
            app_path,
            process_name: process_name.into(),
        }
    }
}

#[async_trait]
impl AppController for SystemAppController {
    async fn is_running(&self) -> bool {
        let mut command = Command::new("pgrep");
        command.arg("-x").arg(&self.process_name).kill_on_drop(true);
        let output = command.output();

        match tokio::time::timeout(PGREP_TIMEOUT, output).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                tracing::warn!("Failed to run pgrep: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!("pgrep timed out after {:?}", PGREP_TIMEOUT);
                false
            }
        }
    }

    async fn launch(&self) -> Result<()> {
        if !self.app_path.exists() {
            return Err(MusicboxError::SonicPi(SonicPiError::LaunchFailed {
                path: self.app_path.display().to_string(),
                message: "application not found".to_string(),
            }));
        }

        tracing::info!("Launching Sonic Pi from {}", self.app_path.display());
        open::that_detached(&self.app_path).map_err(|e| {
            MusicboxError::SonicPi(SonicPiError::LaunchFailed {
                path: self.app_path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    fn app_path(&self) -> &std::path::Path {
        &self.app_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_missing_app() {
        let dir = tempfile::tempdir().unwrap();
        let controller = SystemAppController::new(dir.path().join("Sonic Pi.app"), "Sonic Pi");
        let err = controller.launch().await.unwrap_err();
        assert!(matches!(
            err,
            MusicboxError::SonicPi(SonicPiError::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_process_is_not_running() {
        let controller =
            SystemAppController::new(PathBuf::from("/nonexistent"), "musicbox-no-such-process");
        assert!(!controller.is_running().await);
    }
}
