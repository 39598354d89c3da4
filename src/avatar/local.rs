//! Locally rendered presenter card: a colored background with the narration
//! text, held for a fixed duration. Used whenever the remote service is
//! unavailable or fails for a slide.

use std::path::Path;

use crate::config::AvatarStyle;
use crate::foundation::core::Fps;
use crate::foundation::error::SlidecastResult;
use crate::media::encode::{EncodeOpts, FrameEncoder};
use crate::render::text::{TextBrush, TextLayoutEngine, fill_layout, load_font_bytes};

use super::AvatarClip;

const CARD_WIDTH: u32 = 640;
const CARD_HEIGHT: u32 = 480;
const CARD_DURATION_SECS: f64 = 5.0;
/// Text wraps inside a 20px margin on each side.
const CARD_MARGIN_PX: f64 = 20.0;

pub struct LocalAvatarRenderer {
    style: AvatarStyle,
    fps: Fps,
    engine: TextLayoutEngine,
    font: Option<(Vec<u8>, vello_cpu::peniko::FontData)>,
}

impl LocalAvatarRenderer {
    pub fn new(style: AvatarStyle, fps: Fps) -> Self {
        let font = load_font_bytes(None).ok().map(|bytes| {
            let data =
                vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes.clone()), 0);
            (bytes, data)
        });
        Self {
            style,
            fps,
            engine: TextLayoutEngine::new(),
            font,
        }
    }

    /// Render the card clip to `out_path`.
    pub fn produce(&mut self, text: &str, out_path: &Path) -> SlidecastResult<AvatarClip> {
        let frame = self.render_card(text)?;

        let frames = self.fps.secs_to_frames_round(CARD_DURATION_SECS).max(1);
        let mut encoder = FrameEncoder::start(EncodeOpts {
            out_path: out_path.to_path_buf(),
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
            fps: self.fps,
            audio: None,
        })?;
        for _ in 0..frames {
            encoder.push_frame(&frame)?;
        }
        encoder.finish()?;

        Ok(AvatarClip {
            path: out_path.to_path_buf(),
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
            duration_secs: self.fps.frames_to_secs(frames),
        })
    }

    /// One premultiplied RGBA frame: style background plus centered text.
    fn render_card(&mut self, text: &str) -> SlidecastResult<Vec<u8>> {
        let (bg, font_size) = style_palette(self.style);

        let width_u16 = CARD_WIDTH as u16;
        let height_u16 = CARD_HEIGHT as u16;
        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(bg[0], bg[1], bg[2], 255));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(CARD_WIDTH),
            f64::from(CARD_HEIGHT),
        ));

        let text = text.trim();
        if !text.is_empty()
            && let Some((bytes, data)) = self.font.as_ref()
        {
            let wrap = (f64::from(CARD_WIDTH) - 2.0 * CARD_MARGIN_PX) as f32;
            let layout =
                self.engine
                    .layout_plain(text, bytes, font_size, TextBrush::WHITE, Some(wrap))?;
            let x = ((f64::from(CARD_WIDTH) - f64::from(layout.width())) / 2.0).max(CARD_MARGIN_PX);
            let y =
                ((f64::from(CARD_HEIGHT) - f64::from(layout.height())) / 2.0).max(CARD_MARGIN_PX);
            fill_layout(&mut ctx, data, &layout, x, y);
        }

        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        Ok(pixmap.data_as_u8_slice().to_vec())
    }
}

/// Background color and text size per style.
fn style_palette(style: AvatarStyle) -> ([u8; 3], f32) {
    match style {
        AvatarStyle::Default => ([41, 128, 185], 40.0),
        AvatarStyle::Professional => ([44, 62, 80], 36.0),
        AvatarStyle::Casual => ([46, 204, 113], 44.0),
        AvatarStyle::Educational => ([142, 68, 173], 40.0),
    }
}
