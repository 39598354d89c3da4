//! PPTX (Office Open XML) extraction.
//!
//! Reads the deck straight out of the ZIP container with a streaming XML
//! event loop. Slide order comes from `p:sldIdLst` in `presentation.xml`,
//! resolved through the relationship table; when the list is missing the
//! slide relationships are ordered by their part number instead.
//!
//! A slide whose XML cannot be parsed degrades to an empty [`Slide`] so one
//! bad part never sinks the whole deck. Only an unreadable container or a
//! missing relationship table is fatal.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;
use zip::ZipArchive;

use super::{
    DEFAULT_PAGE_HEIGHT_EMU, DEFAULT_PAGE_WIDTH_EMU, ShapeBox, ShapeKind, Slide, SlideShape,
};
use crate::foundation::error::{SlidecastError, SlidecastResult};

/// A parsed deck, slides in presentation order.
#[derive(Debug)]
pub struct PptxDocument {
    pub slides: Vec<Slide>,
    /// Page size in EMU.
    pub page_emu: (i64, i64),
}

impl PptxDocument {
    pub fn open(path: &Path) -> SlidecastResult<Self> {
        let file = File::open(path).map_err(|e| {
            SlidecastError::document_read(format!("open {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> SlidecastResult<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| SlidecastError::document_read(format!("open archive: {e}")))?;

        let manifest = read_presentation_manifest(&mut archive)?;
        let order = slide_paths_in_order(&mut archive, &manifest.slide_rel_ids)?;

        let mut slides = Vec::with_capacity(order.len());
        for (index, slide_path) in order.iter().enumerate() {
            match parse_slide(&mut archive, slide_path, index, manifest.page_emu) {
                Ok(slide) => slides.push(slide),
                Err(err) => {
                    warn!(slide = index, error = %err, "slide part unreadable, using empty slide");
                    slides.push(Slide {
                        index,
                        shapes: Vec::new(),
                        page_emu: manifest.page_emu,
                    });
                }
            }
        }

        Ok(Self {
            slides,
            page_emu: manifest.page_emu,
        })
    }
}

struct PresentationManifest {
    page_emu: (i64, i64),
    /// Relationship ids from `p:sldIdLst`, in presentation order.
    slide_rel_ids: Vec<String>,
}

fn read_presentation_manifest<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> SlidecastResult<PresentationManifest> {
    let mut manifest = PresentationManifest {
        page_emu: (DEFAULT_PAGE_WIDTH_EMU, DEFAULT_PAGE_HEIGHT_EMU),
        slide_rel_ids: Vec::new(),
    };

    let xml = match read_archive_string(archive, "ppt/presentation.xml") {
        Ok(xml) => xml,
        Err(err) => {
            warn!(error = %err, "presentation.xml missing, using default page size");
            return Ok(manifest);
        }
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"sldSz" => {
                        let mut cx = None;
                        let mut cy = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"cx" => cx = parse_emu(&attr.value),
                                b"cy" => cy = parse_emu(&attr.value),
                                _ => {}
                            }
                        }
                        if let (Some(cx), Some(cy)) = (cx, cy) {
                            manifest.page_emu = (cx, cy);
                        }
                    }
                    b"sldId" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"r:id" {
                                manifest
                                    .slide_rel_ids
                                    .push(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SlidecastError::document_read(format!(
                    "parse presentation.xml: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(manifest)
}

#[derive(Debug, Clone, Default)]
struct Relationship {
    rel_type: String,
    target: String,
}

fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rels_path: &str,
) -> SlidecastResult<HashMap<String, Relationship>> {
    let xml = read_archive_string(archive, rels_path)?;
    let mut rels = HashMap::new();

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel = Relationship::default();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Type" => {
                            rel.rel_type = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        b"Target" => {
                            rel.target = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        _ => {}
                    }
                }
                if !id.is_empty() {
                    rels.insert(id, rel);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SlidecastError::document_read(format!(
                    "parse {rels_path}: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

fn is_slide_rel(rel_type: &str) -> bool {
    rel_type.ends_with("/slide")
}

fn slide_paths_in_order<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rel_ids: &[String],
) -> SlidecastResult<Vec<String>> {
    let rels = read_relationships(archive, "ppt/_rels/presentation.xml.rels")?;

    if !rel_ids.is_empty() {
        let mut paths = Vec::with_capacity(rel_ids.len());
        for id in rel_ids {
            match rels.get(id) {
                Some(rel) => paths.push(resolve_part_path("ppt", &rel.target)),
                None => warn!(rel_id = %id, "slide id list references unknown relationship"),
            }
        }
        return Ok(paths);
    }

    // No sldIdLst: fall back to the slide parts ordered by their number.
    let mut numbered: Vec<(Option<usize>, String)> = rels
        .values()
        .filter(|rel| is_slide_rel(&rel.rel_type))
        .map(|rel| {
            let path = resolve_part_path("ppt", &rel.target);
            (extract_part_number(&path), path)
        })
        .collect();
    numbered.sort_by(|a, b| match (a.0, b.0) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

/// Accumulator for one `p:sp` / `p:pic` while walking slide XML.
#[derive(Debug, Default)]
struct RawShape {
    bounds_off: Option<(i64, i64)>,
    bounds_ext: Option<(i64, i64)>,
    paragraphs: Vec<String>,
    has_text_body: bool,
    is_title: bool,
    image_rel: Option<String>,
}

impl RawShape {
    fn bounds(&self) -> Option<ShapeBox> {
        let (x, y) = self.bounds_off?;
        let (w, h) = self.bounds_ext?;
        Some(ShapeBox { x, y, w, h })
    }
}

fn parse_slide<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    slide_path: &str,
    index: usize,
    page_emu: (i64, i64),
) -> SlidecastResult<Slide> {
    let xml = read_archive_string(archive, slide_path)?;
    let raw_shapes = extract_shapes(&xml, slide_path)?;

    // Relationship table for embedded media. A slide with no pictures has no
    // rels part, so a miss here is not an error.
    let rels = read_relationships(archive, &rels_path_for(slide_path)).unwrap_or_default();
    let base_dir = part_dir(slide_path);

    let mut shapes = Vec::with_capacity(raw_shapes.len());
    for raw in raw_shapes {
        let bounds = raw.bounds();
        let kind = if let Some(rel_id) = &raw.image_rel {
            match rels.get(rel_id) {
                Some(rel) => {
                    let media_path = resolve_part_path(base_dir, &rel.target);
                    match read_archive_bytes(archive, &media_path) {
                        Ok(bytes) => ShapeKind::Picture { bytes },
                        Err(err) => {
                            warn!(slide = index, part = %media_path, error = %err,
                                "embedded image unreadable");
                            ShapeKind::Other
                        }
                    }
                }
                None => {
                    warn!(slide = index, rel_id = %rel_id, "picture references unknown relationship");
                    ShapeKind::Other
                }
            }
        } else if raw.has_text_body {
            ShapeKind::Text {
                paragraphs: raw.paragraphs,
                is_title: raw.is_title,
            }
        } else {
            ShapeKind::Other
        };
        shapes.push(SlideShape { bounds, kind });
    }

    Ok(Slide {
        index,
        shapes,
        page_emu,
    })
}

#[derive(Default)]
struct ShapeWalk {
    shapes: Vec<RawShape>,
    current: Option<RawShape>,
    in_text_body: bool,
    in_paragraph: bool,
    paragraph: String,
}

impl ShapeWalk {
    /// Shared handler for `Start` and `Empty` events.
    fn open_tag(&mut self, e: &quick_xml::events::BytesStart<'_>, is_empty: bool) {
        match local_name(e.name().as_ref()) {
            b"sp" | b"pic" if !is_empty => {
                self.current = Some(RawShape::default());
            }
            b"off" => {
                if let Some(shape) = self.current.as_mut() {
                    shape.bounds_off = read_point_attrs(e, b"x", b"y");
                }
            }
            b"ext" => {
                if let Some(shape) = self.current.as_mut() {
                    // Keep the first extent seen; later ones belong to
                    // nested effect elements.
                    if shape.bounds_ext.is_none() {
                        shape.bounds_ext = read_point_attrs(e, b"cx", b"cy");
                    }
                }
            }
            b"ph" => {
                if let Some(shape) = self.current.as_mut() {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"type" {
                            let value = String::from_utf8_lossy(&attr.value);
                            if value == "title" || value == "ctrTitle" {
                                shape.is_title = true;
                            }
                        }
                    }
                }
            }
            b"blip" => {
                if let Some(shape) = self.current.as_mut() {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"r:embed" {
                            shape.image_rel =
                                Some(String::from_utf8_lossy(&attr.value).to_string());
                        }
                    }
                }
            }
            b"txBody" if !is_empty => {
                if let Some(shape) = self.current.as_mut() {
                    shape.has_text_body = true;
                    self.in_text_body = true;
                }
            }
            b"p" if self.in_text_body && !is_empty => {
                self.in_paragraph = true;
                self.paragraph.clear();
            }
            b"br" if self.in_paragraph => {
                // Hard line break acts as a paragraph boundary.
                if let Some(shape) = self.current.as_mut() {
                    shape.paragraphs.push(std::mem::take(&mut self.paragraph));
                }
            }
            _ => {}
        }
    }

    fn close_tag(&mut self, e: &quick_xml::events::BytesEnd<'_>) {
        match local_name(e.name().as_ref()) {
            b"sp" | b"pic" => {
                if let Some(shape) = self.current.take() {
                    self.shapes.push(shape);
                }
                self.in_text_body = false;
                self.in_paragraph = false;
                self.paragraph.clear();
            }
            b"txBody" => self.in_text_body = false,
            b"p" => {
                if self.in_paragraph {
                    if let Some(shape) = self.current.as_mut() {
                        shape.paragraphs.push(std::mem::take(&mut self.paragraph));
                    }
                    self.in_paragraph = false;
                }
            }
            _ => {}
        }
    }
}

fn extract_shapes(xml: &str, slide_path: &str) -> SlidecastResult<Vec<RawShape>> {
    let mut walk = ShapeWalk::default();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => walk.open_tag(e, false),
            Ok(Event::Empty(ref e)) => walk.open_tag(e, true),
            Ok(Event::Text(ref e)) => {
                if walk.in_paragraph {
                    walk.paragraph.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => walk.close_tag(e),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SlidecastError::document_read(format!(
                    "parse {slide_path}: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(walk.shapes)
}

fn read_point_attrs(
    e: &quick_xml::events::BytesStart<'_>,
    first: &[u8],
    second: &[u8],
) -> Option<(i64, i64)> {
    let mut a = None;
    let mut b = None;
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        if key == first {
            a = parse_emu(&attr.value);
        } else if key == second {
            b = parse_emu(&attr.value);
        }
    }
    Some((a?, b?))
}

fn parse_emu(value: &[u8]) -> Option<i64> {
    String::from_utf8_lossy(value).parse::<i64>().ok()
}

fn read_archive_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> SlidecastResult<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| SlidecastError::document_read(format!("part not found '{path}': {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| SlidecastError::document_read(format!("read '{path}': {e}")))?;
    Ok(content)
}

fn read_archive_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> SlidecastResult<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| SlidecastError::document_read(format!("part not found '{path}': {e}")))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| SlidecastError::document_read(format!("read '{path}': {e}")))?;
    Ok(bytes)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Rels part for a slide part: `ppt/slides/slide1.xml` ->
/// `ppt/slides/_rels/slide1.xml.rels`.
fn rels_path_for(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_path}.rels"),
    }
}

fn part_dir(part_path: &str) -> &str {
    part_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relationship target against its base directory, folding `..`
/// segments. Absolute targets (leading `/`) are archive-rooted.
fn resolve_part_path(base_dir: &str, target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Trailing number of a part name like `slide12.xml`.
fn extract_part_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml");
    let digits: String = s
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.chars().rev().collect::<String>().parse().ok()
}
