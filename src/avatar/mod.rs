//! Presenter ("talking head") clip production.
//!
//! A remote talks API produces a real talking-head clip; when it is not
//! configured, or a request for one slide fails, a locally rendered card
//! with the narration text takes its place. Cancellation aborts remote
//! polling and is the only remote error that propagates.

pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::PipelineConfig;
use crate::foundation::core::CancelToken;
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::media::probe::probe_media;

pub use local::LocalAvatarRenderer;
pub use remote::RemoteAvatarService;

/// A finished presenter clip on disk.
#[derive(Clone, Debug)]
pub struct AvatarClip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

pub struct AvatarProvider {
    remote: Option<RemoteAvatarService>,
    local: LocalAvatarRenderer,
}

impl AvatarProvider {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            remote: config
                .avatar
                .clone()
                .map(|remote| RemoteAvatarService::new(remote, config.avatar_style)),
            local: LocalAvatarRenderer::new(config.avatar_style, config.output_fps()),
        }
    }

    /// Produce a presenter clip for `text`, writing into `dir` under `name`.
    /// Remote failures fall back to the local renderer; only cancellation
    /// and a local render failure are errors.
    pub fn produce(
        &mut self,
        text: &str,
        name: &str,
        dir: &Path,
        cancel: &CancelToken,
    ) -> SlidecastResult<AvatarClip> {
        cancel.check()?;

        if let Some(remote) = &self.remote {
            let out_path = dir.join(format!("{name}_remote.mp4"));
            match remote.produce(text, &out_path, cancel) {
                Ok(()) => match probe_media(&out_path) {
                    Ok(info) if info.has_video && info.width > 0 => {
                        return Ok(AvatarClip {
                            path: out_path,
                            width: info.width,
                            height: info.height,
                            duration_secs: info.duration_secs,
                        });
                    }
                    Ok(_) => {
                        warn!(clip = name, "remote clip has no video stream, falling back");
                    }
                    Err(err) => {
                        warn!(clip = name, error = %err, "remote clip unreadable, falling back");
                    }
                },
                Err(err @ SlidecastError::Cancelled) => return Err(err),
                Err(err) => {
                    warn!(clip = name, error = %err, "remote avatar failed, falling back");
                }
            }
        }

        let out_path = dir.join(format!("{name}_local.mp4"));
        self.local.produce(text, &out_path)
    }
}
