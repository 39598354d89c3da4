//! Parley-based text shaping shared by the slide renderer and the local
//! presenter renderer.

use std::path::{Path, PathBuf};

use crate::foundation::error::{SlidecastError, SlidecastResult};

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl TextBrush {
    pub const BLACK: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out plain text using provided font bytes and styling.
    ///
    /// With `max_width_px` set, lines soft-wrap at that width; `\n` always
    /// forces a break.
    pub fn layout_plain(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: TextBrush,
        max_width_px: Option<f32>,
    ) -> SlidecastResult<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(SlidecastError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            SlidecastError::slide_render("no font families registered from font bytes")
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| SlidecastError::slide_render("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

/// Draw a finished layout into `ctx` at `(origin_x, origin_y)` canvas
/// coordinates. The caller is responsible for transform state around glyph
/// paints staying at identity.
pub fn fill_layout(
    ctx: &mut vello_cpu::RenderContext,
    font: &vello_cpu::peniko::FontData,
    layout: &parley::Layout<TextBrush>,
    origin_x: f64,
    origin_y: f64,
) {
    ctx.set_transform(vello_cpu::kurbo::Affine::translate((origin_x, origin_y)));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
}

/// Well-known sans-serif font locations, probed in order when no explicit
/// font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation2/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load font bytes from the configured path, or the first readable
/// candidate.
pub fn load_font_bytes(explicit: Option<&Path>) -> SlidecastResult<Vec<u8>> {
    if let Some(path) = explicit {
        return std::fs::read(path).map_err(|e| {
            SlidecastError::validation(format!("read font '{}': {e}", path.display()))
        });
    }
    for candidate in FONT_CANDIDATES {
        let path = PathBuf::from(candidate);
        if let Ok(bytes) = std::fs::read(&path) {
            return Ok(bytes);
        }
    }
    Err(SlidecastError::slide_render(
        "no usable font found; set font_path in the configuration",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_rejected() {
        let mut engine = TextLayoutEngine::new();
        let err = engine.layout_plain("x", &[0u8; 4], 0.0, TextBrush::BLACK, None);
        assert!(err.is_err());
    }

    #[test]
    fn garbage_font_bytes_fail_cleanly() {
        let mut engine = TextLayoutEngine::new();
        let err = engine.layout_plain("x", &[1, 2, 3, 4], 12.0, TextBrush::BLACK, Some(100.0));
        assert!(err.is_err());
    }

    #[test]
    fn explicit_missing_font_path_errors() {
        let err = load_font_bytes(Some(Path::new("/nonexistent/font.ttf")));
        assert!(err.is_err());
    }
}
