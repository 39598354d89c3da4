//! End-to-end run against a synthetic deck. Needs `ffmpeg` and `ffprobe`
//! on PATH; silently passes when they are absent.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use slidecast::config::PipelineConfig;
use slidecast::media::probe::probe_media;
use slidecast::Assembler;
use zip::write::FileOptions;

fn ffmpeg_tools_available() -> bool {
    let ffmpeg_ok = Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    let ffprobe_ok = Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    ffmpeg_ok && ffprobe_ok
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "slidecast_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn slide_xml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
        <p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
               xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
          <p:cSld><p:spTree>
            <p:sp>
              <p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
              <p:spPr><a:xfrm>
                <a:off x="457200" y="274638"/>
                <a:ext cx="8229600" cy="1143000"/>
              </a:xfrm></p:spPr>
              <p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody>
            </p:sp>
            <p:sp>
              <p:spPr><a:xfrm>
                <a:off x="457200" y="1600200"/>
                <a:ext cx="8229600" cy="4525963"/>
              </a:xfrm></p:spPr>
              <p:txBody><a:p><a:r><a:t>{body}</a:t></a:r></a:p></p:txBody>
            </p:sp>
          </p:spTree></p:cSld>
        </p:sld>"#
    )
}

fn write_fixture_deck(path: &std::path::Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default();
    let slide_rel =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";

    writer.start_file("ppt/presentation.xml", options).unwrap();
    writer
        .write_all(
            br#"<?xml version="1.0"?>
            <p:presentation
                xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
                xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
              <p:sldIdLst>
                <p:sldId id="256" r:id="rId2"/>
                <p:sldId id="257" r:id="rId3"/>
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
                  <Relationship Id="rId2" Type="{slide_rel}" Target="slides/slide1.xml"/>
                  <Relationship Id="rId3" Type="{slide_rel}" Target="slides/slide2.xml"/>
                </Relationships>"#
            )
            .as_bytes(),
        )
        .unwrap();

    writer.start_file("ppt/slides/slide1.xml", options).unwrap();
    writer
        .write_all(slide_xml("Welcome", "This is the first slide.").as_bytes())
        .unwrap();

    writer.start_file("ppt/slides/slide2.xml", options).unwrap();
    writer
        .write_all(slide_xml("Details", "And this is the second one.").as_bytes())
        .unwrap();

    writer.finish().unwrap();
}

#[test]
fn deck_renders_to_playable_mp4() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }

    let tmp = temp_dir("pipeline_smoke");
    std::fs::create_dir_all(&tmp).unwrap();
    let deck_path = tmp.join("deck.pptx");
    let out_path = tmp.join("out/presentation.mp4");
    write_fixture_deck(&deck_path);

    // Defaults: local presenter card, espeak or silent narration, 720p.
    let assembler = Assembler::new(PipelineConfig::default()).unwrap();
    let report = assembler.run(&deck_path, &out_path).unwrap();

    assert_eq!(report.slides_total, 2);
    assert_eq!(report.slides_succeeded, 2);
    assert!(out_path.exists());

    let info = probe_media(&out_path).unwrap();
    assert!(info.has_video);
    assert!(info.has_audio);
    assert_eq!(info.width, 1280);
    assert_eq!(info.height, 720);
    // Two slides, each at least the 1s floor. Concat copy keeps the
    // combined length within container rounding of the reported total.
    assert!(info.duration_secs >= 1.9);
    assert!((info.duration_secs - report.duration_secs).abs() < 0.5);

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn parallel_run_matches_slide_count() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }

    let tmp = temp_dir("pipeline_parallel");
    std::fs::create_dir_all(&tmp).unwrap();
    let deck_path = tmp.join("deck.pptx");
    let out_path = tmp.join("presentation.mp4");
    write_fixture_deck(&deck_path);

    let config = PipelineConfig {
        parallel: true,
        threads: Some(2),
        ..PipelineConfig::default()
    };
    let assembler = Assembler::new(config).unwrap();
    let report = assembler.run(&deck_path, &out_path).unwrap();

    assert_eq!(report.slides_succeeded, 2);
    assert!(out_path.exists());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn cancelled_run_reports_cancellation() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }

    let tmp = temp_dir("pipeline_cancel");
    std::fs::create_dir_all(&tmp).unwrap();
    let deck_path = tmp.join("deck.pptx");
    let out_path = tmp.join("presentation.mp4");
    write_fixture_deck(&deck_path);

    let assembler = Assembler::new(PipelineConfig::default()).unwrap();
    assembler.cancel_token().cancel();
    let err = assembler.run(&deck_path, &out_path).unwrap_err();

    assert!(matches!(err, slidecast::SlidecastError::Cancelled));
    assert!(!out_path.exists());

    std::fs::remove_dir_all(&tmp).ok();
}
