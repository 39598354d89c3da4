//! Narration synthesis.
//!
//! Three backends, tried in configuration order: a remote HTTP endpoint
//! (OpenAI-style audio/speech), a local `espeak-ng`/`espeak` binary, and a
//! silence generator. `synthesize` never fails: any backend error is logged
//! and replaced with a silent track, so narration problems cost audio on one
//! slide, never the slide itself.
//!
//! All tracks come out as interleaved stereo `f32le` PCM files at 48 kHz,
//! the format the segment encoder feeds straight to ffmpeg.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{PipelineConfig, RemoteTtsConfig, VoiceType};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::media::probe::decode_audio_f32_stereo;
use crate::media::write_pcm_f32le;

/// Pipeline-wide narration PCM format.
pub const NARRATION_SAMPLE_RATE: u32 = 48_000;
pub const NARRATION_CHANNELS: u16 = 2;

/// Interleaved sample count covering at least `secs`, always a whole
/// number of stereo frames: per-channel frames are ceiled first so a
/// fractional duration never leaves a half frame at the end.
fn stereo_sample_count(secs: f64) -> usize {
    let frames = (secs * f64::from(NARRATION_SAMPLE_RATE)).ceil() as usize;
    frames * usize::from(NARRATION_CHANNELS)
}

/// One slide's narration as a PCM file on disk.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub index: usize,
    /// Raw interleaved stereo `f32le` at [`NARRATION_SAMPLE_RATE`].
    pub pcm_path: PathBuf,
    pub duration_secs: f64,
    /// True when the track is a silent stand-in rather than real speech.
    pub is_silent: bool,
}

enum SpeechBackend {
    Remote(RemoteTtsConfig),
    Espeak { program: &'static str },
    Silent,
}

pub struct NarrationSynthesizer {
    backend: SpeechBackend,
    client: Option<reqwest::blocking::Client>,
    voice: VoiceType,
    rate: f64,
    pitch: i32,
    min_duration_secs: f64,
}

impl NarrationSynthesizer {
    pub fn new(config: &PipelineConfig) -> Self {
        let (backend, client) = if let Some(tts) = config.tts.clone() {
            (SpeechBackend::Remote(tts), Some(reqwest::blocking::Client::new()))
        } else if let Some(program) = find_espeak() {
            (SpeechBackend::Espeak { program }, None)
        } else {
            warn!("no speech backend available, narration will be silent");
            (SpeechBackend::Silent, None)
        };
        Self {
            backend,
            client,
            voice: config.voice,
            rate: config.speech_rate,
            pitch: config.speech_pitch,
            min_duration_secs: config.min_slide_duration,
        }
    }

    /// Produce a narration track for one slide. Empty text and backend
    /// failures both resolve to a silent track.
    pub fn synthesize(&self, text: &str, index: usize, dir: &Path) -> AudioTrack {
        let text = text.trim();
        if text.is_empty() {
            return self.silent_track(index, dir);
        }

        match self.attempt(text, index, dir) {
            Ok(track) => track,
            Err(err) => {
                warn!(slide = index, error = %err, "narration synthesis failed, using silence");
                self.silent_track(index, dir)
            }
        }
    }

    fn attempt(&self, text: &str, index: usize, dir: &Path) -> SlidecastResult<AudioTrack> {
        let raw_path = match &self.backend {
            SpeechBackend::Remote(tts) => {
                let path = dir.join(format!("narration_{index}.mp3"));
                self.synthesize_remote(tts, text, &path)?;
                path
            }
            SpeechBackend::Espeak { program } => {
                let path = dir.join(format!("narration_{index}.wav"));
                self.synthesize_espeak(program, text, &path)?;
                path
            }
            SpeechBackend::Silent => {
                return Ok(self.silent_track(index, dir));
            }
        };

        let mut pcm = decode_audio_f32_stereo(&raw_path, NARRATION_SAMPLE_RATE)?;
        if pcm.interleaved_f32.is_empty() {
            return Err(SlidecastError::synthesis(
                "backend produced an empty audio stream",
            ));
        }

        // Pad short narration with trailing silence up to the configured
        // floor; the segment length follows the padded duration.
        let min_samples = stereo_sample_count(self.min_duration_secs);
        if pcm.interleaved_f32.len() < min_samples {
            pcm.interleaved_f32.resize(min_samples, 0.0);
        }

        let pcm_path = dir.join(format!("narration_{index}.f32le"));
        write_pcm_f32le(&pcm_path, &pcm.interleaved_f32)?;
        let duration_secs = pcm.duration_secs();
        debug!(slide = index, duration_secs, "narration synthesized");

        Ok(AudioTrack {
            index,
            pcm_path,
            duration_secs,
            is_silent: false,
        })
    }

    fn synthesize_remote(
        &self,
        tts: &RemoteTtsConfig,
        text: &str,
        out_path: &Path,
    ) -> SlidecastResult<()> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let voice = match (&tts.voice, self.voice) {
            (Some(explicit), _) => explicit.as_str(),
            (None, VoiceType::Female) => "nova",
            (None, VoiceType::Male) => "onyx",
        };
        let request = TtsRequest {
            model: tts.model.as_deref(),
            input: text,
            voice,
            speed: self.rate,
        };

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SlidecastError::synthesis("remote backend has no http client"))?;
        let response = client
            .post(&tts.endpoint)
            .header("Authorization", format!("Bearer {}", tts.api_key))
            .json(&request)
            .send()
            .map_err(|e| SlidecastError::synthesis(format!("tts request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SlidecastError::synthesis(format!(
                "tts endpoint returned {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .map_err(|e| SlidecastError::synthesis(format!("tts response read failed: {e}")))?;
        if audio.is_empty() {
            return Err(SlidecastError::synthesis("tts endpoint returned no audio"));
        }
        std::fs::write(out_path, &audio).map_err(|e| {
            SlidecastError::synthesis(format!("write '{}': {e}", out_path.display()))
        })?;
        Ok(())
    }

    fn synthesize_espeak(
        &self,
        program: &str,
        text: &str,
        out_path: &Path,
    ) -> SlidecastResult<()> {
        let out = std::process::Command::new(program)
            .arg("-w")
            .arg(out_path)
            .args([
                "-s",
                &espeak_wpm(self.rate).to_string(),
                "-p",
                &espeak_pitch(self.pitch).to_string(),
                "-v",
                espeak_voice(self.voice),
            ])
            .arg(text)
            .output()
            .map_err(|e| SlidecastError::synthesis(format!("failed to run {program}: {e}")))?;
        if !out.status.success() {
            return Err(SlidecastError::synthesis(format!(
                "{program} exited with status {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Silent stand-in track: at least one second, more when the configured
    /// slide floor is higher.
    fn silent_track(&self, index: usize, dir: &Path) -> AudioTrack {
        let duration_secs = self.min_duration_secs.max(1.0);
        let samples = stereo_sample_count(duration_secs);
        let pcm_path = dir.join(format!("narration_{index}.f32le"));
        if let Err(err) = write_pcm_f32le(&pcm_path, &vec![0.0f32; samples]) {
            // Leave the file missing; the composer will fail this slide and
            // the run continues with the rest.
            warn!(slide = index, error = %err, "could not write silent track");
        }
        AudioTrack {
            index,
            pcm_path,
            duration_secs,
            is_silent: true,
        }
    }
}

fn find_espeak() -> Option<&'static str> {
    for program in ["espeak-ng", "espeak"] {
        let found = std::process::Command::new(program)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if found {
            return Some(program);
        }
    }
    None
}

/// espeak speaks ~175 wpm at the neutral rate; the multiplier scales that,
/// clamped to espeak's usable range.
fn espeak_wpm(rate: f64) -> i32 {
    ((175.0 * rate).round() as i32).clamp(80, 450)
}

/// Config pitch is `[-50, 50]` around espeak's default of 50 on a 0..99
/// scale.
fn espeak_pitch(pitch: i32) -> i32 {
    (50 + pitch).clamp(0, 99)
}

fn espeak_voice(voice: VoiceType) -> &'static str {
    match voice {
        VoiceType::Female => "en+f3",
        VoiceType::Male => "en+m3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wpm_scales_and_clamps() {
        assert_eq!(espeak_wpm(1.0), 175);
        assert_eq!(espeak_wpm(0.5), 88);
        assert_eq!(espeak_wpm(2.0), 350);
        assert_eq!(espeak_wpm(0.1), 80);
        assert_eq!(espeak_wpm(10.0), 450);
    }

    #[test]
    fn pitch_centers_on_espeak_default() {
        assert_eq!(espeak_pitch(0), 50);
        assert_eq!(espeak_pitch(-50), 0);
        assert_eq!(espeak_pitch(50), 99);
    }

    #[test]
    fn voices_map_to_variants() {
        assert_eq!(espeak_voice(VoiceType::Female), "en+f3");
        assert_eq!(espeak_voice(VoiceType::Male), "en+m3");
    }

    #[test]
    fn sample_counts_are_whole_stereo_frames() {
        assert_eq!(stereo_sample_count(1.0), 96_000);
        assert_eq!(stereo_sample_count(2.0), 192_000);
        // A fractional floor must still land on a frame boundary.
        let samples = stereo_sample_count(2.100001);
        assert_eq!(samples % usize::from(NARRATION_CHANNELS), 0);
        assert_eq!(samples, 201_602);
    }

    #[test]
    fn silent_track_honors_duration_floor() {
        let dir = std::env::temp_dir().join(format!("slidecast_speech_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut config = PipelineConfig::default();
        config.min_slide_duration = 2.0;
        config.tts = None;
        let synth = NarrationSynthesizer {
            backend: SpeechBackend::Silent,
            client: None,
            voice: config.voice,
            rate: config.speech_rate,
            pitch: config.speech_pitch,
            min_duration_secs: config.min_slide_duration,
        };

        let track = synth.synthesize("anything", 0, &dir);
        assert!(track.is_silent);
        assert_eq!(track.duration_secs, 2.0);
        let bytes = std::fs::read(&track.pcm_path).unwrap();
        assert_eq!(bytes.len(), 2 * 48_000 * 2 * 4);
        assert!(bytes.iter().all(|&b| b == 0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_text_goes_silent_without_backend_call() {
        let dir = std::env::temp_dir().join(format!(
            "slidecast_speech_empty_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let synth = NarrationSynthesizer {
            // A remote backend with an unreachable endpoint: it must never
            // be contacted for empty text.
            backend: SpeechBackend::Remote(RemoteTtsConfig {
                api_key: "k".into(),
                endpoint: "http://127.0.0.1:1/speech".into(),
                model: None,
                voice: None,
            }),
            client: Some(reqwest::blocking::Client::new()),
            voice: VoiceType::Female,
            rate: 1.0,
            pitch: 0,
            min_duration_secs: 1.0,
        };
        let track = synth.synthesize("   ", 7, &dir);
        assert!(track.is_silent);
        assert_eq!(track.duration_secs, 1.0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
