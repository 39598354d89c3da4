//! D-ID compatible talks client: submit, poll, download.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{AvatarStyle, RemoteAvatarConfig};
use crate::foundation::core::CancelToken;
use crate::foundation::error::{SlidecastError, SlidecastResult};

/// Stock presenter portrait and voice for a given avatar style.
fn presenter(style: AvatarStyle) -> (&'static str, &'static str) {
    match style {
        AvatarStyle::Default | AvatarStyle::Educational => (
            "https://create-images-results.d-id.com/DefaultPresenters/Emma_f/image.jpg",
            "en-US-JennyNeural",
        ),
        AvatarStyle::Professional => (
            "https://create-images-results.d-id.com/DefaultPresenters/John_f/image.jpg",
            "en-US-GuyNeural",
        ),
        AvatarStyle::Casual => (
            "https://create-images-results.d-id.com/DefaultPresenters/Sarah_f/image.jpg",
            "en-US-AriaNeural",
        ),
    }
}

pub struct RemoteAvatarService {
    client: reqwest::blocking::Client,
    config: RemoteAvatarConfig,
    source_url: &'static str,
    voice_id: &'static str,
}

#[derive(serde::Serialize)]
struct TalkScript<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    input: &'a str,
    provider: TalkVoiceProvider,
}

#[derive(serde::Serialize)]
struct TalkVoiceProvider {
    #[serde(rename = "type")]
    kind: &'static str,
    voice_id: &'static str,
}

#[derive(serde::Serialize)]
struct TalkRequest<'a> {
    script: TalkScript<'a>,
    source_url: &'static str,
}

#[derive(serde::Deserialize)]
struct TalkCreated {
    id: String,
}

#[derive(serde::Deserialize)]
struct TalkStatus {
    status: String,
    result_url: Option<String>,
    error: Option<serde_json::Value>,
}

impl RemoteAvatarService {
    pub fn new(config: RemoteAvatarConfig, style: AvatarStyle) -> Self {
        let (source_url, voice_id) = presenter(style);
        Self {
            client: reqwest::blocking::Client::new(),
            config,
            source_url,
            voice_id,
        }
    }

    /// Submit a talk, poll until done, and download the clip to `out_path`.
    pub fn produce(&self, text: &str, out_path: &Path, cancel: &CancelToken) -> SlidecastResult<()> {
        let talk_id = self.submit(text)?;
        debug!(talk_id = %talk_id, "talk submitted");
        let result_url = self.poll(&talk_id, cancel)?;
        self.download(&result_url, out_path)
    }

    fn submit(&self, text: &str) -> SlidecastResult<String> {
        let request = TalkRequest {
            script: TalkScript {
                kind: "text",
                input: text,
                provider: TalkVoiceProvider {
                    kind: "microsoft",
                    voice_id: self.voice_id,
                },
            },
            source_url: self.source_url,
        };

        let response = self
            .client
            .post(format!("{}/talks", self.config.base_url))
            .header("Authorization", format!("Basic {}", self.config.api_key))
            .json(&request)
            .send()
            .map_err(|e| SlidecastError::avatar_service(format!("talk submit failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SlidecastError::avatar_service(format!(
                "talk submit returned {status}: {body}"
            )));
        }

        let created: TalkCreated = response
            .json()
            .map_err(|e| SlidecastError::avatar_service(format!("talk submit response: {e}")))?;
        Ok(created.id)
    }

    /// Poll until the talk reaches a terminal state, the timeout elapses,
    /// or the run is cancelled.
    fn poll(&self, talk_id: &str, cancel: &CancelToken) -> SlidecastResult<String> {
        let started = Instant::now();
        let interval = Duration::from_secs_f64(self.config.poll_interval_secs.max(0.1));

        loop {
            cancel.check()?;
            if started.elapsed().as_secs_f64() > self.config.timeout_secs {
                return Err(SlidecastError::AvatarTimeout(self.config.timeout_secs));
            }

            let response = self
                .client
                .get(format!("{}/talks/{talk_id}", self.config.base_url))
                .header("Authorization", format!("Basic {}", self.config.api_key))
                .send()
                .map_err(|e| SlidecastError::avatar_service(format!("talk poll failed: {e}")))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                return Err(SlidecastError::avatar_service(format!(
                    "talk poll returned {status}: {body}"
                )));
            }
            let talk: TalkStatus = response
                .json()
                .map_err(|e| SlidecastError::avatar_service(format!("talk poll response: {e}")))?;

            match talk.status.as_str() {
                "done" => {
                    return talk.result_url.ok_or_else(|| {
                        SlidecastError::avatar_service("talk finished without result_url")
                    });
                }
                "error" | "rejected" => {
                    return Err(SlidecastError::avatar_service(format!(
                        "talk failed: {}",
                        talk.error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "unknown error".to_string())
                    )));
                }
                // "created" / "started" / "processing": keep waiting.
                _ => std::thread::sleep(interval),
            }
        }
    }

    fn download(&self, url: &str, out_path: &Path) -> SlidecastResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SlidecastError::avatar_service(format!("clip download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SlidecastError::avatar_service(format!(
                "clip download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| SlidecastError::avatar_service(format!("clip download read: {e}")))?;
        if bytes.is_empty() {
            return Err(SlidecastError::avatar_service("clip download was empty"));
        }
        std::fs::write(out_path, &bytes).map_err(|e| {
            SlidecastError::avatar_service(format!("write '{}': {e}", out_path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn talk_request_shape_matches_api() {
        let request = TalkRequest {
            script: TalkScript {
                kind: "text",
                input: "Hello",
                provider: TalkVoiceProvider {
                    kind: "microsoft",
                    voice_id: "en-US-JennyNeural",
                },
            },
            source_url: presenter(AvatarStyle::Default).0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["script"]["type"], "text");
        assert_eq!(value["script"]["input"], "Hello");
        assert_eq!(value["script"]["provider"]["voice_id"], "en-US-JennyNeural");
        assert!(value["source_url"].as_str().unwrap().starts_with("https://"));
    }

    #[test]
    fn styles_select_distinct_presenters() {
        let (default_url, default_voice) = presenter(AvatarStyle::Default);
        let (pro_url, pro_voice) = presenter(AvatarStyle::Professional);
        let (casual_url, casual_voice) = presenter(AvatarStyle::Casual);
        assert_ne!(default_url, pro_url);
        assert_ne!(default_url, casual_url);
        assert_ne!(pro_url, casual_url);
        assert_ne!(default_voice, pro_voice);
        assert_ne!(default_voice, casual_voice);
        // Styles without their own presenter use the default pairing.
        assert_eq!(presenter(AvatarStyle::Educational), presenter(AvatarStyle::Default));
    }

    #[test]
    fn service_carries_the_style_mapped_presenter() {
        let service = RemoteAvatarService::new(
            RemoteAvatarConfig {
                api_key: "k".into(),
                base_url: "http://127.0.0.1:1".into(),
                poll_interval_secs: 0.1,
                timeout_secs: 60.0,
            },
            AvatarStyle::Professional,
        );
        assert_eq!(service.voice_id, "en-US-GuyNeural");
        assert!(service.source_url.contains("John_f"));
    }

    #[test]
    fn terminal_statuses_parse() {
        let done: TalkStatus =
            serde_json::from_str(r#"{"status":"done","result_url":"https://x/clip.mp4"}"#).unwrap();
        assert_eq!(done.status, "done");
        assert_eq!(done.result_url.as_deref(), Some("https://x/clip.mp4"));

        let failed: TalkStatus =
            serde_json::from_str(r#"{"status":"error","error":{"kind":"ValidationError"}}"#)
                .unwrap();
        assert_eq!(failed.status, "error");
        assert!(failed.error.is_some());
    }

    #[test]
    fn cancelled_token_stops_polling_immediately() {
        let service = RemoteAvatarService::new(
            RemoteAvatarConfig {
                api_key: "k".into(),
                base_url: "http://127.0.0.1:1".into(),
                poll_interval_secs: 0.1,
                timeout_secs: 60.0,
            },
            AvatarStyle::Default,
        );
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = service.poll("talk-1", &cancel).unwrap_err();
        assert!(matches!(err, SlidecastError::Cancelled));
    }
}
