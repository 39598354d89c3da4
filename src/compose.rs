//! Per-slide segment composition.
//!
//! One segment is the slide raster held for the narration's duration with
//! the presenter clip overlaid in a corner, encoded together with the
//! narration PCM. The video length is derived from the audio: frame count is
//! the narration duration rounded to whole frames, and the PCM is padded or
//! trimmed to land exactly on that frame boundary, so `-shortest` in the
//! encoder can never cut a segment short.

use std::path::{Path, PathBuf};

use crate::avatar::AvatarClip;
use crate::config::{AvatarCorner, Transition};
use crate::foundation::core::{Affine, Fps, frame_to_sample};
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::media::encode::{AudioInput, EncodeOpts, FrameEncoder};
use crate::media::probe::{MediaInfo, decode_video_frames_rgba8};
use crate::render::RenderedImage;
use crate::render::raster::{premultiply_rgba8_in_place, rgba_premul_to_image};
use crate::speech::{AudioTrack, NARRATION_CHANNELS, NARRATION_SAMPLE_RATE};

/// Presenter overlay inset from the canvas edges.
const AVATAR_INSET_PX: f64 = 50.0;
/// Presenter overlay width as a fraction of the canvas width.
const AVATAR_WIDTH_FRACTION: f64 = 0.25;
/// Fade-in length at the start of each segment.
const FADE_SECS: f64 = 0.5;
/// Avatar frames decoded per ffmpeg invocation.
const AVATAR_BATCH_FRAMES: u32 = 64;

/// One finished per-slide MP4 segment.
#[derive(Clone, Debug)]
pub struct SlideSegment {
    pub index: usize,
    pub path: PathBuf,
    pub frames: u64,
    pub duration_secs: f64,
}

pub struct SlideComposer {
    width: u32,
    height: u32,
    fps: Fps,
    corner: AvatarCorner,
    transition: Transition,
}

impl SlideComposer {
    pub fn new(
        width: u32,
        height: u32,
        fps: Fps,
        corner: AvatarCorner,
        transition: Transition,
    ) -> Self {
        Self {
            width,
            height,
            fps,
            corner,
            transition,
        }
    }

    /// Compose one segment. The segment's frame count comes from the
    /// narration duration; audio and video are aligned to the same frame
    /// boundary.
    pub fn compose(
        &self,
        image: &RenderedImage,
        audio: &AudioTrack,
        avatar: &AvatarClip,
        out_path: &Path,
    ) -> SlidecastResult<SlideSegment> {
        let frames = self
            .fps
            .secs_to_frames_round(audio.duration_secs)
            .max(1);
        let audio_path = self.align_audio_to_frames(audio, frames, out_path)?;

        let slide_paint = self.slide_paint(image)?;
        let layout = avatar_layout(
            self.width,
            self.height,
            avatar.width,
            avatar.height,
            self.corner,
        );
        let mut avatar_frames = AvatarFrameCursor::new(avatar, self.fps);

        let width_u16: u16 = self
            .width
            .try_into()
            .map_err(|_| SlidecastError::validation("canvas width exceeds u16"))?;
        let height_u16: u16 = self
            .height
            .try_into()
            .map_err(|_| SlidecastError::validation("canvas height exceeds u16"))?;

        let mut encoder = FrameEncoder::start(EncodeOpts {
            out_path: out_path.to_path_buf(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            audio: Some(AudioInput {
                path: audio_path,
                sample_rate: NARRATION_SAMPLE_RATE,
                channels: NARRATION_CHANNELS,
            }),
        })?;

        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        let fade_frames = match self.transition {
            Transition::Fade => self.fps.secs_to_frames_round(FADE_SECS),
            Transition::None => 0,
        };

        for frame_idx in 0..frames {
            ctx.reset();

            // Slide background.
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(slide_paint.clone());
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(self.width),
                f64::from(self.height),
            ));

            // Presenter overlay; the last decoded frame holds for the rest
            // of the segment when the clip is shorter than the narration.
            if let Some(avatar_rgba) = avatar_frames.next_frame()? {
                let paint = rgba_premul_to_image(avatar_rgba, avatar.width, avatar.height)?;
                let transform = Affine::translate((layout.x, layout.y))
                    * Affine::scale(layout.scale);
                ctx.set_transform(crate::render::raster::affine_to_cpu(transform));
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(avatar.width),
                    f64::from(avatar.height),
                ));
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            }

            // Fade in from black over the first half second.
            let alpha = fade_alpha(frame_idx, fade_frames);
            if alpha > 0 {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, alpha));
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(self.width),
                    f64::from(self.height),
                ));
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
            encoder.push_frame(pixmap.data_as_u8_slice())?;
        }
        encoder.finish()?;

        Ok(SlideSegment {
            index: image.index,
            path: out_path.to_path_buf(),
            frames,
            duration_secs: self.fps.frames_to_secs(frames),
        })
    }

    fn slide_paint(&self, image: &RenderedImage) -> SlidecastResult<vello_cpu::Image> {
        let decoded = image::open(&image.path)
            .map_err(|e| {
                SlidecastError::media(format!("read slide png '{}': {e}", image.path.display()))
            })?
            .to_rgba8();
        let (w, h) = decoded.dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(SlidecastError::validation(format!(
                "slide raster is {w}x{h}, expected {}x{}",
                self.width, self.height
            )));
        }
        let mut bytes = decoded.into_raw();
        premultiply_rgba8_in_place(&mut bytes);
        rgba_premul_to_image(&bytes, w, h)
    }

    /// Write a PCM file whose sample count matches `frames` exactly.
    fn align_audio_to_frames(
        &self,
        audio: &AudioTrack,
        frames: u64,
        out_path: &Path,
    ) -> SlidecastResult<PathBuf> {
        let bytes = std::fs::read(&audio.pcm_path).map_err(|e| {
            SlidecastError::media(format!(
                "read narration pcm '{}': {e}",
                audio.pcm_path.display()
            ))
        })?;
        let per_channel = frame_to_sample(frames, self.fps, NARRATION_SAMPLE_RATE);
        let aligned = align_pcm_bytes(bytes, per_channel, NARRATION_CHANNELS);

        let aligned_path = out_path.with_extension("f32le");
        std::fs::write(&aligned_path, aligned).map_err(|e| {
            SlidecastError::media(format!("write '{}': {e}", aligned_path.display()))
        })?;
        Ok(aligned_path)
    }
}

/// Pad with silence or trim so the buffer holds exactly
/// `samples_per_channel * channels` f32 samples.
fn align_pcm_bytes(mut bytes: Vec<u8>, samples_per_channel: u64, channels: u16) -> Vec<u8> {
    let target = samples_per_channel as usize * channels as usize * 4;
    bytes.resize(target, 0);
    bytes
}

/// Placement of the presenter overlay on the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AvatarLayout {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

/// Scale the presenter to a quarter of the canvas width and tuck it into
/// the configured corner with a fixed inset.
pub(crate) fn avatar_layout(
    canvas_w: u32,
    canvas_h: u32,
    avatar_w: u32,
    avatar_h: u32,
    corner: AvatarCorner,
) -> AvatarLayout {
    let target_w = f64::from(canvas_w) * AVATAR_WIDTH_FRACTION;
    let scale = target_w / f64::from(avatar_w.max(1));
    let scaled_h = f64::from(avatar_h) * scale;

    let x = f64::from(canvas_w) - target_w - AVATAR_INSET_PX;
    let y = match corner {
        AvatarCorner::TopRight => AVATAR_INSET_PX,
        AvatarCorner::BottomRight => f64::from(canvas_h) - scaled_h - AVATAR_INSET_PX,
    };
    AvatarLayout { x, y, scale }
}

/// Overlay alpha for the fade-in: opaque black at frame 0 falling to clear
/// at `fade_frames`.
fn fade_alpha(frame_idx: u64, fade_frames: u64) -> u8 {
    if fade_frames == 0 || frame_idx >= fade_frames {
        return 0;
    }
    let remaining = 1.0 - (frame_idx as f64 / fade_frames as f64);
    (remaining * 255.0).round() as u8
}

/// Sequentially decodes presenter frames at the output fps in small
/// batches, holding the final frame once the clip runs out.
struct AvatarFrameCursor {
    info: MediaInfo,
    fps: Fps,
    batch: std::collections::VecDeque<Vec<u8>>,
    decoded: u64,
    exhausted: bool,
    last: Option<Vec<u8>>,
}

impl AvatarFrameCursor {
    fn new(avatar: &AvatarClip, fps: Fps) -> Self {
        Self {
            info: MediaInfo {
                path: avatar.path.clone(),
                width: avatar.width,
                height: avatar.height,
                duration_secs: avatar.duration_secs,
                has_video: true,
                has_audio: false,
            },
            fps,
            batch: std::collections::VecDeque::new(),
            decoded: 0,
            exhausted: false,
            last: None,
        }
    }

    fn next_frame(&mut self) -> SlidecastResult<Option<&Vec<u8>>> {
        if self.batch.is_empty() && !self.exhausted {
            let start = self.fps.frames_to_secs(self.decoded);
            let mut frames =
                decode_video_frames_rgba8(&self.info, self.fps, start, AVATAR_BATCH_FRAMES)?;
            if frames.len() < AVATAR_BATCH_FRAMES as usize {
                self.exhausted = true;
            }
            self.decoded += frames.len() as u64;
            for frame in &mut frames {
                premultiply_rgba8_in_place(frame);
            }
            self.batch.extend(frames);
        }

        if let Some(frame) = self.batch.pop_front() {
            self.last = Some(frame);
        }
        Ok(self.last.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_sits_in_bottom_right_by_default() {
        let layout = avatar_layout(1280, 720, 640, 480, AvatarCorner::BottomRight);
        // Quarter width: 320px wide at scale 0.5, 240px tall.
        assert!((layout.scale - 0.5).abs() < 1e-9);
        assert!((layout.x - (1280.0 - 320.0 - 50.0)).abs() < 1e-9);
        assert!((layout.y - (720.0 - 240.0 - 50.0)).abs() < 1e-9);
    }

    #[test]
    fn avatar_top_right_uses_fixed_inset() {
        let layout = avatar_layout(1280, 720, 640, 480, AvatarCorner::TopRight);
        assert_eq!(layout.y, 50.0);
    }

    #[test]
    fn fade_alpha_ramps_down_to_zero() {
        assert_eq!(fade_alpha(0, 15), 255);
        assert!(fade_alpha(7, 15) < 255);
        assert!(fade_alpha(7, 15) > 0);
        assert_eq!(fade_alpha(15, 15), 0);
        assert_eq!(fade_alpha(0, 0), 0);
    }

    #[test]
    fn pcm_alignment_pads_and_trims() {
        // 2 samples/channel stereo target: 16 bytes.
        let padded = align_pcm_bytes(vec![1u8; 8], 2, 2);
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..8], &[1u8; 8]);
        assert_eq!(&padded[8..], &[0u8; 8]);

        let trimmed = align_pcm_bytes(vec![1u8; 32], 2, 2);
        assert_eq!(trimmed.len(), 16);
    }

    #[test]
    fn segment_frames_follow_audio_duration() {
        let fps = Fps { num: 30, den: 1 };
        // 2.5s narration at 30fps: exactly 75 frames and 120000 samples.
        let frames = fps.secs_to_frames_round(2.5).max(1);
        assert_eq!(frames, 75);
        assert_eq!(frame_to_sample(frames, fps, 48_000), 120_000);
    }
}
