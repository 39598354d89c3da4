//! Run configuration for the deck-to-video pipeline.
//!
//! A [`PipelineConfig`] can be built in code, loaded from a JSON file, or
//! assembled from CLI flags. `validate` is called once at assembler
//! construction so every later stage can trust the values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::core::Fps;
use crate::foundation::error::{SlidecastError, SlidecastResult};

/// Narration voice selection, mapped by each speech backend to a concrete
/// voice identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    #[default]
    Female,
    Male,
}

/// Visual style for locally rendered presenter clips and the presenter
/// selection for the remote service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarStyle {
    #[default]
    Default,
    Professional,
    Casual,
    Educational,
}

/// Output resolution preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoQuality {
    #[serde(rename = "720p")]
    #[default]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl VideoQuality {
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
        }
    }
}

/// Per-slide intro transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    Fade,
    None,
}

/// Which corner of the slide the presenter overlay occupies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvatarCorner {
    TopRight,
    #[default]
    BottomRight,
}

/// Remote talking-head service (D-ID compatible talks API).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteAvatarConfig {
    pub api_key: String,
    #[serde(default = "default_avatar_base_url")]
    pub base_url: String,
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    /// Total seconds to wait for a clip before giving up.
    #[serde(default = "default_avatar_timeout")]
    pub timeout_secs: f64,
}

fn default_avatar_base_url() -> String {
    "https://api.d-id.com".to_string()
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_avatar_timeout() -> f64 {
    60.0
}

/// Remote speech synthesis endpoint. When absent the pipeline falls back to
/// a local espeak binary, then to silence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteTtsConfig {
    pub api_key: String,
    pub endpoint: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides the voice derived from [`VoiceType`] when set.
    #[serde(default)]
    pub voice: Option<String>,
}

/// Optional chat-completions endpoint used to rewrite extracted slide text
/// into narration prose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExplanationConfig {
    pub api_key: String,
    #[serde(default = "default_explanation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_explanation_model")]
    pub model: String,
}

fn default_explanation_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_explanation_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Full pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub voice: VoiceType,
    /// Speech rate multiplier, accepted range `[0.5, 2.0]`.
    pub speech_rate: f64,
    /// Pitch shift in the backend's unit scale, accepted range `[-50, 50]`.
    pub speech_pitch: i32,
    pub avatar_style: AvatarStyle,
    pub quality: VideoQuality,
    pub transition: Transition,
    /// Floor on per-slide duration in seconds. Narration shorter than this is
    /// padded with trailing silence.
    pub min_slide_duration: f64,
    pub fps: u32,
    pub avatar_corner: AvatarCorner,
    /// Process slides across a worker pool instead of sequentially.
    pub parallel: bool,
    /// Worker count for parallel runs. `None` lets the pool decide.
    pub threads: Option<usize>,
    /// Explicit TTF/OTF to use for slide text. When unset, a small list of
    /// well-known system font paths is probed.
    pub font_path: Option<PathBuf>,
    /// Append a short "presentation is ready" presenter clip next to the
    /// output file.
    pub closing_avatar: bool,
    pub avatar: Option<RemoteAvatarConfig>,
    pub tts: Option<RemoteTtsConfig>,
    pub explanation: Option<ExplanationConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            voice: VoiceType::default(),
            speech_rate: 1.0,
            speech_pitch: 0,
            avatar_style: AvatarStyle::default(),
            quality: VideoQuality::default(),
            transition: Transition::default(),
            min_slide_duration: 1.0,
            fps: 30,
            avatar_corner: AvatarCorner::default(),
            parallel: false,
            threads: None,
            font_path: None,
            closing_avatar: false,
            avatar: None,
            tts: None,
            explanation: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> SlidecastResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SlidecastError::validation(format!("read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| {
            SlidecastError::validation(format!("parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SlidecastResult<()> {
        if !(0.5..=2.0).contains(&self.speech_rate) {
            return Err(SlidecastError::validation(format!(
                "speech_rate {} outside [0.5, 2.0]",
                self.speech_rate
            )));
        }
        if !(-50..=50).contains(&self.speech_pitch) {
            return Err(SlidecastError::validation(format!(
                "speech_pitch {} outside [-50, 50]",
                self.speech_pitch
            )));
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(SlidecastError::validation(format!(
                "fps {} outside [1, 120]",
                self.fps
            )));
        }
        if !self.min_slide_duration.is_finite() || self.min_slide_duration < 0.0 {
            return Err(SlidecastError::validation(
                "min_slide_duration must be finite and >= 0",
            ));
        }
        if self.threads == Some(0) {
            return Err(SlidecastError::validation("threads must be > 0 when set"));
        }
        Ok(())
    }

    pub fn output_fps(&self) -> Fps {
        Fps {
            num: self.fps,
            den: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fps, 30);
        assert_eq!(config.quality.resolution(), (1280, 720));
        assert_eq!(config.min_slide_duration, 1.0);
    }

    #[test]
    fn rate_and_pitch_bounds_enforced() {
        let mut config = PipelineConfig::default();
        config.speech_rate = 0.25;
        assert!(config.validate().is_err());
        config.speech_rate = 2.0;
        assert!(config.validate().is_ok());
        config.speech_pitch = 51;
        assert!(config.validate().is_err());
        config.speech_pitch = -50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_round_trip_with_optional_sections() {
        let raw = r#"{
            "voice": "male",
            "quality": "1080p",
            "transition": "none",
            "min_slide_duration": 2.5,
            "avatar": { "api_key": "k" },
            "tts": { "api_key": "k", "endpoint": "https://tts.example/v1/speech" }
        }"#;
        let config: PipelineConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.voice, VoiceType::Male);
        assert_eq!(config.quality.resolution(), (1920, 1080));
        assert_eq!(config.transition, Transition::None);
        assert_eq!(config.min_slide_duration, 2.5);
        let avatar = config.avatar.as_ref().unwrap();
        assert_eq!(avatar.base_url, "https://api.d-id.com");
        assert_eq!(avatar.timeout_secs, 60.0);
        assert!(config.explanation.is_none());
        // Unconfigured sections stay at defaults.
        assert_eq!(config.fps, 30);
    }
}
