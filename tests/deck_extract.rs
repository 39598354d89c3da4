use std::io::{Cursor, Write};

use slidecast::PptxDocument;
use zip::write::FileOptions;

const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";

fn slide_xml(title: Option<&str>, body_lines: &[&str]) -> String {
    let mut shapes = String::new();
    if let Some(title) = title {
        shapes.push_str(&format!(
            r#"<p:sp>
                 <p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
                 <p:spPr><a:xfrm>
                   <a:off x="457200" y="274638"/>
                   <a:ext cx="8229600" cy="1143000"/>
                 </a:xfrm></p:spPr>
                 <p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody>
               </p:sp>"#
        ));
    }
    if !body_lines.is_empty() {
        let paragraphs: String = body_lines
            .iter()
            .map(|line| format!("<a:p><a:r><a:t>{line}</a:t></a:r></a:p>"))
            .collect();
        shapes.push_str(&format!(
            r#"<p:sp>
                 <p:spPr><a:xfrm>
                   <a:off x="457200" y="1600200"/>
                   <a:ext cx="8229600" cy="4525963"/>
                 </a:xfrm></p:spPr>
                 <p:txBody>{paragraphs}</p:txBody>
               </p:sp>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
           <p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
                  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
                  xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
             <p:cSld><p:spTree>{shapes}</p:spTree></p:cSld>
           </p:sld>"#
    )
}

/// A two-slide deck where `sldIdLst` deliberately lists the higher-numbered
/// part first, so part numbering and presentation order disagree.
fn fixture_deck() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    writer
        .start_file("ppt/presentation.xml", options)
        .unwrap();
    writer
        .write_all(
            br#"<?xml version="1.0"?>
            <p:presentation
                xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
                xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
              <p:sldIdLst>
                <p:sldId id="257" r:id="rId3"/>
                <p:sldId id="256" r:id="rId2"/>
              </p:sldIdLst>
              <p:sldSz cx="9144000" cy="6858000"/>
            </p:presentation>"#,
        )
        .unwrap();

    writer
        .start_file("ppt/_rels/presentation.xml.rels", options)
        .unwrap();
    writer
        .write_all(
            format!(
                r#"<?xml version="1.0"?>
                <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
                  <Relationship Id="rId2" Type="{SLIDE_REL_TYPE}" Target="slides/slide1.xml"/>
                  <Relationship Id="rId3" Type="{SLIDE_REL_TYPE}" Target="slides/slide2.xml"/>
                </Relationships>"#
            )
            .as_bytes(),
        )
        .unwrap();

    writer.start_file("ppt/slides/slide1.xml", options).unwrap();
    writer
        .write_all(slide_xml(Some("Intro"), &["Hello", "World"]).as_bytes())
        .unwrap();

    writer.start_file("ppt/slides/slide2.xml", options).unwrap();
    writer
        .write_all(slide_xml(None, &["Second slide"]).as_bytes())
        .unwrap();

    writer.finish().unwrap().into_inner()
}

#[test]
fn deck_follows_slide_id_list_order() {
    let doc = PptxDocument::from_reader(Cursor::new(fixture_deck())).unwrap();

    assert_eq!(doc.slides.len(), 2);
    assert_eq!(doc.page_emu, (9_144_000, 6_858_000));

    // rId3 (slide2.xml) comes first in sldIdLst.
    assert_eq!(doc.slides[0].narration_text(), "Second slide");
    assert_eq!(doc.slides[1].narration_text(), "Title: Intro Hello World");
    assert_eq!(doc.slides[0].index, 0);
    assert_eq!(doc.slides[1].index, 1);
}

#[test]
fn labels_name_each_slide_once() {
    let doc = PptxDocument::from_reader(Cursor::new(fixture_deck())).unwrap();
    assert_eq!(doc.slides[0].label(), "Slide 1");
    assert_eq!(doc.slides[1].label(), "Slide 2");
    // The label already carries the word, so headers built from it must
    // not prepend it again.
    let header = format!("--- {} ---", doc.slides[0].label());
    assert_eq!(header.matches("Slide").count(), 1);
}

#[test]
fn title_shape_is_flagged() {
    let doc = PptxDocument::from_reader(Cursor::new(fixture_deck())).unwrap();

    let titled = &doc.slides[1];
    assert!(titled.shapes.iter().any(|s| s.is_title()));
    assert!(doc.slides[0].shapes.iter().all(|s| !s.is_title()));
}

#[test]
fn shapes_carry_emu_bounds() {
    let doc = PptxDocument::from_reader(Cursor::new(fixture_deck())).unwrap();

    let bounds = doc.slides[1]
        .shapes
        .iter()
        .find(|s| s.is_title())
        .and_then(|s| s.bounds)
        .expect("title shape has bounds");
    assert_eq!(bounds.x, 457_200);
    assert_eq!(bounds.w, 8_229_600);
}

#[test]
fn garbage_container_is_rejected() {
    let err = PptxDocument::from_reader(Cursor::new(b"not a zip".to_vec())).unwrap_err();
    assert!(err.to_string().contains("archive"));
}
