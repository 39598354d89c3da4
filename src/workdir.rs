//! Per-run scratch directory with retried cleanup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::foundation::error::{SlidecastError, SlidecastResult};

const CLEANUP_ATTEMPTS: u32 = 3;
const CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Scratch directory for one pipeline run. Removal is attempted up to three
/// times (encoders on some platforms release file handles slightly after
/// process exit); a directory that still cannot be removed is reported, not
/// fatal.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    cleaned: bool,
}

impl RunDir {
    /// Create a fresh `slidecast_<pid>_<nanos>` directory under the system
    /// temp dir.
    pub fn create() -> SlidecastResult<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!("slidecast_{}_{}", std::process::id(), nanos));
        std::fs::create_dir_all(&path).map_err(|e| {
            SlidecastError::validation(format!("create scratch dir '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), "scratch directory created");
        Ok(Self {
            path,
            cleaned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: impl AsRef<str>) -> PathBuf {
        self.path.join(name.as_ref())
    }

    /// Remove the directory and everything in it, retrying transient
    /// failures.
    pub fn cleanup(&mut self) -> SlidecastResult<()> {
        if self.cleaned || !self.path.exists() {
            self.cleaned = true;
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 1..=CLEANUP_ATTEMPTS {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => {
                    self.cleaned = true;
                    debug!(path = %self.path.display(), "scratch directory removed");
                    return Ok(());
                }
                Err(err) => {
                    if attempt < CLEANUP_ATTEMPTS {
                        warn!(
                            path = %self.path.display(),
                            attempt,
                            error = %err,
                            "scratch cleanup failed, retrying"
                        );
                        std::thread::sleep(CLEANUP_RETRY_DELAY);
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(SlidecastError::cleanup(format!(
            "could not remove '{}' after {CLEANUP_ATTEMPTS} attempts: {}",
            self.path.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if !self.cleaned
            && let Err(err) = self.cleanup()
        {
            warn!(error = %err, "leaking scratch directory");
        }
    }
}
