//! Rasterizes one slide onto the output canvas.
//!
//! Shape geometry comes in EMU and is mapped linearly onto the canvas.
//! Shapes without geometry fall back to fixed bands so text from
//! layout-inherited placeholders still lands somewhere sensible. A shape
//! that fails to draw is skipped; a slide that fails outright degrades to a
//! white placeholder carrying the slide ordinal, so rendering never decides
//! a slide's fate on its own.

use std::path::{Path, PathBuf};

use kurbo::Rect;
use tracing::warn;

use crate::deck::{ShapeBox, ShapeKind, Slide, SlideShape};
use crate::foundation::core::Affine;
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::render::raster::{decode_image, rgba_premul_to_image};
use crate::render::text::{TextBrush, TextLayoutEngine, fill_layout, load_font_bytes};

/// Title glyphs are 1/15 of the shape box's short edge, body 1/25.
const TITLE_SIZE_DIVISOR: f64 = 15.0;
const BODY_SIZE_DIVISOR: f64 = 25.0;
/// Horizontal padding subtracted from a text box before wrapping.
const WRAP_PADDING_PX: f64 = 20.0;
/// Left inset for body text inside its box.
const BODY_INSET_PX: f64 = 10.0;

/// A slide rasterized to a PNG on disk.
#[derive(Clone, Debug)]
pub struct RenderedImage {
    pub index: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct SlideRenderer {
    width: u32,
    height: u32,
    engine: TextLayoutEngine,
    font: Option<LoadedFont>,
    ctx: Option<vello_cpu::RenderContext>,
}

struct LoadedFont {
    bytes: Vec<u8>,
    data: vello_cpu::peniko::FontData,
}

impl SlideRenderer {
    /// Build a renderer for a fixed canvas size. A missing font is not
    /// fatal here: text shapes are skipped and the placeholder falls back
    /// to a blank page.
    pub fn new(width: u32, height: u32, font_path: Option<&Path>) -> Self {
        let font = match load_font_bytes(font_path) {
            Ok(bytes) => {
                let data = vello_cpu::peniko::FontData::new(
                    vello_cpu::peniko::Blob::from(bytes.clone()),
                    0,
                );
                Some(LoadedFont { bytes, data })
            }
            Err(err) => {
                warn!(error = %err, "no font available, slide text will be skipped");
                None
            }
        };
        Self {
            width,
            height,
            engine: TextLayoutEngine::new(),
            font,
            ctx: None,
        }
    }

    /// Rasterize `slide` and write it as a PNG. Draw failures degrade to a
    /// placeholder; only a placeholder that itself cannot be produced or
    /// written is an error.
    pub fn render_to_png(
        &mut self,
        slide: &Slide,
        out_path: &Path,
    ) -> SlidecastResult<RenderedImage> {
        let bytes = match self.draw_slide(slide) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(slide = slide.index, error = %err, "slide draw failed, using placeholder");
                self.draw_placeholder(slide)?
            }
        };

        image::save_buffer_with_format(
            out_path,
            &bytes,
            self.width,
            self.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|e| {
            SlidecastError::slide_render(format!("write png '{}': {e}", out_path.display()))
        })?;

        Ok(RenderedImage {
            index: slide.index,
            path: out_path.to_path_buf(),
            width: self.width,
            height: self.height,
        })
    }

    fn draw_slide(&mut self, slide: &Slide) -> SlidecastResult<Vec<u8>> {
        self.with_ctx_mut(|this, ctx| {
            fill_background(ctx, this.width, this.height);

            for (shape_i, shape) in slide.shapes.iter().enumerate() {
                if let Err(err) = this.draw_shape(ctx, slide, shape) {
                    warn!(
                        slide = slide.index,
                        shape = shape_i,
                        error = %err,
                        "shape skipped"
                    );
                }
            }
            Ok(())
        })
    }

    fn draw_shape(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        slide: &Slide,
        shape: &SlideShape,
    ) -> SlidecastResult<()> {
        let is_title = shape.is_title();
        let rect = match shape.bounds {
            Some(bounds) => map_emu_rect(bounds, slide.page_emu, self.width, self.height),
            None => fallback_band(is_title, self.width, self.height),
        };

        match &shape.kind {
            ShapeKind::Picture { bytes } => {
                let prepared = decode_image(bytes)?;
                if prepared.width == 0 || prepared.height == 0 {
                    return Err(SlidecastError::slide_render("picture has zero size"));
                }
                let paint = rgba_premul_to_image(
                    &prepared.rgba8_premul,
                    prepared.width,
                    prepared.height,
                )?;
                let transform = Affine::translate((rect.x0, rect.y0))
                    * Affine::scale_non_uniform(
                        rect.width() / f64::from(prepared.width),
                        rect.height() / f64::from(prepared.height),
                    );
                ctx.set_transform(crate::render::raster::affine_to_cpu(transform));
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(prepared.width),
                    f64::from(prepared.height),
                ));
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                Ok(())
            }
            ShapeKind::Text { paragraphs, .. } => {
                let text = paragraphs
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    return Ok(());
                }
                let font = self
                    .font
                    .as_ref()
                    .ok_or_else(|| SlidecastError::slide_render("no font loaded"))?;

                let size = shape_font_size(is_title, rect);
                let wrap = (rect.width() - WRAP_PADDING_PX).max(1.0) as f32;
                let layout = self.engine.layout_plain(
                    &text,
                    &font.bytes,
                    size,
                    TextBrush::BLACK,
                    Some(wrap),
                )?;

                let x = if is_title {
                    // Center the widest line within the box.
                    rect.x0 + ((rect.width() - f64::from(layout.width())) / 2.0).max(0.0)
                } else {
                    rect.x0 + BODY_INSET_PX
                };
                fill_layout(ctx, &font.data, &layout, x, rect.y0);
                Ok(())
            }
            ShapeKind::Other => {
                // Tables, charts, and other unrendered shapes keep their
                // footprint as a thin outline. Nothing to show for shapes
                // with no geometry of their own.
                if shape.bounds.is_some() {
                    draw_outline(ctx, rect);
                }
                Ok(())
            }
        }
    }

    fn draw_placeholder(&mut self, slide: &Slide) -> SlidecastResult<Vec<u8>> {
        let label = slide.label();
        self.with_ctx_mut(|this, ctx| {
            fill_background(ctx, this.width, this.height);

            let Some(font) = this.font.as_ref() else {
                // No font at all: a blank page is the best we can do.
                return Ok(());
            };
            let size = (this.width.min(this.height) as f64 / 12.0) as f32;
            let layout =
                this.engine
                    .layout_plain(&label, &font.bytes, size, TextBrush::BLACK, None)?;
            let x = ((f64::from(this.width) - f64::from(layout.width())) / 2.0).max(0.0);
            let y = ((f64::from(this.height) - f64::from(layout.height())) / 2.0).max(0.0);
            fill_layout(ctx, &font.data, &layout, x, y);
            Ok(())
        })
    }

    /// Reuse one render context across slides, resetting between frames.
    fn with_ctx_mut(
        &mut self,
        f: impl FnOnce(&mut Self, &mut vello_cpu::RenderContext) -> SlidecastResult<()>,
    ) -> SlidecastResult<Vec<u8>> {
        let width_u16: u16 = self
            .width
            .try_into()
            .map_err(|_| SlidecastError::validation("canvas width exceeds u16"))?;
        let height_u16: u16 = self
            .height
            .try_into()
            .map_err(|_| SlidecastError::validation("canvas height exceeds u16"))?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width_u16 && ctx.height() == height_u16 => ctx,
            _ => vello_cpu::RenderContext::new(width_u16, height_u16),
        };
        ctx.reset();

        let result = f(self, &mut ctx);

        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        self.ctx = Some(ctx);

        result?;
        Ok(pixmap.data_as_u8_slice().to_vec())
    }
}

fn fill_background(ctx: &mut vello_cpu::RenderContext, width: u32, height: u32) {
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(width),
        f64::from(height),
    ));
}

/// One-pixel rectangle outline built from four filled edge strips.
fn draw_outline(ctx: &mut vello_cpu::RenderContext, rect: Rect) {
    const EDGE: f64 = 1.0;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(160, 160, 160, 255));
    let edges = [
        Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + EDGE),
        Rect::new(rect.x0, rect.y1 - EDGE, rect.x1, rect.y1),
        Rect::new(rect.x0, rect.y0, rect.x0 + EDGE, rect.y1),
        Rect::new(rect.x1 - EDGE, rect.y0, rect.x1, rect.y1),
    ];
    for edge in edges {
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            edge.x0, edge.y0, edge.x1, edge.y1,
        ));
    }
}

/// Map an EMU shape box onto the pixel canvas.
fn map_emu_rect(bounds: ShapeBox, page_emu: (i64, i64), width: u32, height: u32) -> Rect {
    let (page_w, page_h) = (page_emu.0.max(1) as f64, page_emu.1.max(1) as f64);
    let sx = f64::from(width) / page_w;
    let sy = f64::from(height) / page_h;
    Rect::new(
        bounds.x as f64 * sx,
        bounds.y as f64 * sy,
        (bounds.x + bounds.w) as f64 * sx,
        (bounds.y + bounds.h) as f64 * sy,
    )
}

/// Region used when a shape has no explicit geometry: a title band near the
/// top, a body band across the middle.
fn fallback_band(is_title: bool, width: u32, height: u32) -> Rect {
    let w = f64::from(width);
    let h = f64::from(height);
    if is_title {
        Rect::new(0.05 * w, 0.08 * h, 0.95 * w, 0.22 * h)
    } else {
        Rect::new(0.05 * w, 0.25 * h, 0.95 * w, 0.90 * h)
    }
}

/// Glyph size scales with the shape box so small text boxes do not get
/// canvas-scale text spilling past their rect.
fn shape_font_size(is_title: bool, rect: Rect) -> f32 {
    let short_edge = rect.width().min(rect.height());
    let divisor = if is_title {
        TITLE_SIZE_DIVISOR
    } else {
        BODY_SIZE_DIVISOR
    };
    ((short_edge / divisor).max(8.0)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{DEFAULT_PAGE_HEIGHT_EMU, DEFAULT_PAGE_WIDTH_EMU};

    #[test]
    fn emu_rect_maps_linearly() {
        let bounds = ShapeBox {
            x: DEFAULT_PAGE_WIDTH_EMU / 2,
            y: 0,
            w: DEFAULT_PAGE_WIDTH_EMU / 2,
            h: DEFAULT_PAGE_HEIGHT_EMU / 4,
        };
        let rect = map_emu_rect(
            bounds,
            (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
            1280,
            720,
        );
        assert!((rect.x0 - 640.0).abs() < 1e-6);
        assert!((rect.y0 - 0.0).abs() < 1e-6);
        assert!((rect.width() - 640.0).abs() < 1e-6);
        assert!((rect.height() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn fallback_bands_stay_inside_canvas() {
        for is_title in [true, false] {
            let rect = fallback_band(is_title, 1280, 720);
            assert!(rect.x0 >= 0.0 && rect.x1 <= 1280.0);
            assert!(rect.y0 >= 0.0 && rect.y1 <= 720.0);
            assert!(rect.width() > 0.0 && rect.height() > 0.0);
        }
        let title = fallback_band(true, 1280, 720);
        let body = fallback_band(false, 1280, 720);
        assert!(title.y1 <= body.y0);
    }

    #[test]
    fn title_text_is_larger_than_body() {
        let band = Rect::new(0.0, 0.0, 1200.0, 720.0);
        let title = shape_font_size(true, band);
        let body = shape_font_size(false, band);
        assert!(title > body);
        assert_eq!(title, 48.0);
        // Tiny boxes clamp to a readable floor.
        assert_eq!(shape_font_size(false, Rect::new(0.0, 0.0, 60.0, 40.0)), 8.0);
    }

    #[test]
    fn font_size_tracks_the_shape_box_not_the_canvas() {
        let narrow = Rect::new(100.0, 100.0, 400.0, 350.0);
        let wide = Rect::new(0.0, 0.0, 1200.0, 600.0);
        let narrow_size = shape_font_size(false, narrow);
        let wide_size = shape_font_size(false, wide);
        assert!(narrow_size < wide_size);
        assert_eq!(narrow_size, 10.0);
        assert_eq!(wide_size, 24.0);
    }
}
