//! Slide deck model shared by extraction, rendering, and narration.

pub mod pptx;

pub use pptx::PptxDocument;

/// Default page size in EMU (10" x 7.5", the standard 4:3 deck).
pub const DEFAULT_PAGE_WIDTH_EMU: i64 = 9_144_000;
pub const DEFAULT_PAGE_HEIGHT_EMU: i64 = 6_858_000;

/// Shape placement on the slide page, in EMU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeBox {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

/// What a shape contributes to the slide.
#[derive(Clone, Debug)]
pub enum ShapeKind {
    Text {
        /// One entry per paragraph, in document order.
        paragraphs: Vec<String>,
        is_title: bool,
    },
    Picture {
        /// Raw embedded image bytes (PNG/JPEG as stored in the archive).
        bytes: Vec<u8>,
    },
    /// Recognized but not rendered (tables, charts, group leftovers).
    Other,
}

#[derive(Clone, Debug)]
pub struct SlideShape {
    /// `None` when the shape inherits placement from its layout; the
    /// renderer substitutes a fallback band.
    pub bounds: Option<ShapeBox>,
    pub kind: ShapeKind,
}

impl SlideShape {
    pub fn is_title(&self) -> bool {
        matches!(
            self.kind,
            ShapeKind::Text { is_title: true, .. }
        )
    }
}

/// One slide, fully extracted from the deck.
#[derive(Clone, Debug)]
pub struct Slide {
    /// 0-based position in the deck.
    pub index: usize,
    pub shapes: Vec<SlideShape>,
    /// Page size in EMU, used to map shape boxes onto the output canvas.
    pub page_emu: (i64, i64),
}

impl Slide {
    /// Narration source text: the title first, prefixed with `Title:`, then
    /// body paragraphs in document order, all joined with single spaces.
    /// Blank paragraphs are dropped.
    pub fn narration_text(&self) -> String {
        let mut titles: Vec<String> = Vec::new();
        let mut bodies: Vec<String> = Vec::new();
        for shape in &self.shapes {
            let ShapeKind::Text {
                paragraphs,
                is_title,
            } = &shape.kind
            else {
                continue;
            };
            let joined = paragraphs
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                continue;
            }
            if *is_title {
                titles.push(format!("Title: {joined}"));
            } else {
                bodies.push(joined);
            }
        }
        titles.extend(bodies);
        titles.join(" ")
    }

    /// Human label used for placeholder images and logs (1-based).
    pub fn label(&self) -> String {
        format!("Slide {}", self.index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_shape(paragraphs: &[&str], is_title: bool) -> SlideShape {
        SlideShape {
            bounds: None,
            kind: ShapeKind::Text {
                paragraphs: paragraphs.iter().map(|s| s.to_string()).collect(),
                is_title,
            },
        }
    }

    #[test]
    fn narration_puts_title_first_with_prefix() {
        let slide = Slide {
            index: 0,
            shapes: vec![
                text_shape(&["Hello", "World"], false),
                text_shape(&["Intro"], true),
            ],
            page_emu: (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
        };
        assert_eq!(slide.narration_text(), "Title: Intro Hello World");
    }

    #[test]
    fn multiple_titles_keep_document_order() {
        let slide = Slide {
            index: 0,
            shapes: vec![
                text_shape(&["Body"], false),
                text_shape(&["First"], true),
                text_shape(&["Second"], true),
            ],
            page_emu: (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
        };
        assert_eq!(slide.narration_text(), "Title: First Title: Second Body");
    }

    #[test]
    fn narration_skips_blank_paragraphs_and_pictures() {
        let slide = Slide {
            index: 4,
            shapes: vec![
                SlideShape {
                    bounds: None,
                    kind: ShapeKind::Picture { bytes: vec![1, 2] },
                },
                text_shape(&["  ", "", "Only line  "], false),
            ],
            page_emu: (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
        };
        assert_eq!(slide.narration_text(), "Only line");
        assert_eq!(slide.label(), "Slide 5");
    }

    #[test]
    fn narration_of_empty_slide_is_empty() {
        let slide = Slide {
            index: 0,
            shapes: vec![],
            page_emu: (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
        };
        assert_eq!(slide.narration_text(), "");
    }
}
