//! End-to-end deck-to-video assembly.
//!
//! Per slide: raster, narration, presenter clip, then one MP4 segment; the
//! surviving segments are concatenated in deck order. A slide failure drops
//! that slide and the run continues; only an unreadable deck, cancellation,
//! or losing every slide ends the run. Segment results are stored in
//! index-addressed slots, so dropped slides can never shift a later slide's
//! narration, raster, or position.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::avatar::AvatarProvider;
use crate::compose::{SlideComposer, SlideSegment};
use crate::config::PipelineConfig;
use crate::deck::{PptxDocument, Slide};
use crate::foundation::core::CancelToken;
use crate::foundation::error::{SlidecastError, SlidecastResult};
use crate::media::encode::{concat_mp4_segments, ensure_parent_dir};
use crate::media::probe::{is_ffmpeg_on_path, is_ffprobe_on_path};
use crate::render::SlideRenderer;
use crate::script::ExplanationGenerator;
use crate::speech::NarrationSynthesizer;
use crate::workdir::RunDir;

/// Summary of a finished run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub output: PathBuf,
    pub slides_total: usize,
    pub slides_succeeded: usize,
    pub duration_secs: f64,
}

pub struct Assembler {
    config: PipelineConfig,
    cancel: CancelToken,
}

impl Assembler {
    pub fn new(config: PipelineConfig) -> SlidecastResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Token for cancelling this run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Convert `deck_path` into a narrated video at `out_path`.
    pub fn run(&self, deck_path: &Path, out_path: &Path) -> SlidecastResult<RunReport> {
        if !is_ffmpeg_on_path() || !is_ffprobe_on_path() {
            return Err(SlidecastError::validation(
                "ffmpeg and ffprobe are required on PATH",
            ));
        }

        let doc = PptxDocument::open(deck_path)?;
        info!(
            deck = %deck_path.display(),
            slides = doc.slides.len(),
            "deck opened"
        );

        let mut workdir = RunDir::create()?;
        let result = self.run_inner(&doc, &workdir, out_path);
        if let Err(err) = workdir.cleanup() {
            warn!(error = %err, "scratch cleanup incomplete");
        }
        result
    }

    fn run_inner(
        &self,
        doc: &PptxDocument,
        workdir: &RunDir,
        out_path: &Path,
    ) -> SlidecastResult<RunReport> {
        if doc.slides.is_empty() {
            return Err(SlidecastError::NoSlidesProcessed);
        }

        let texts = self.narration_texts(doc)?;
        let synthesizer = NarrationSynthesizer::new(&self.config);

        let slots = if self.config.parallel {
            self.process_parallel(doc, &texts, &synthesizer, workdir)?
        } else {
            self.process_sequential(doc, &texts, &synthesizer, workdir)?
        };

        let segments = surviving_segments(slots)?;
        let slides_succeeded = segments.len();
        let duration_secs: f64 = segments.iter().map(|s| s.duration_secs).sum();

        // Concatenate into the scratch dir first so a failed run never
        // leaves a partial file at the destination.
        let staged = workdir.file("final.mp4");
        let paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();
        concat_mp4_segments(&paths, &workdir.file("segments.txt"), &staged)?;

        ensure_parent_dir(out_path)?;
        move_file(&staged, out_path)?;

        if self.config.closing_avatar {
            self.write_closing_clip(workdir, out_path);
        }

        info!(
            output = %out_path.display(),
            slides_total = doc.slides.len(),
            slides_succeeded,
            duration_secs,
            "presentation video finished"
        );

        Ok(RunReport {
            output: out_path.to_path_buf(),
            slides_total: doc.slides.len(),
            slides_succeeded,
            duration_secs,
        })
    }

    /// Narration text per slide, optionally rewritten into spoken prose.
    fn narration_texts(&self, doc: &PptxDocument) -> SlidecastResult<Vec<String>> {
        let generator = self.config.explanation.clone().map(ExplanationGenerator::new);
        let mut texts = Vec::with_capacity(doc.slides.len());
        for slide in &doc.slides {
            self.cancel.check()?;
            let extracted = slide.narration_text();
            let text = match &generator {
                Some(generator) => generator.rewrite(&extracted),
                None => extracted,
            };
            texts.push(text);
        }
        Ok(texts)
    }

    fn process_sequential(
        &self,
        doc: &PptxDocument,
        texts: &[String],
        synthesizer: &NarrationSynthesizer,
        workdir: &RunDir,
    ) -> SlidecastResult<Vec<Option<SlideSegment>>> {
        let mut worker = SlideWorker::new(&self.config);
        let mut slots: Vec<Option<SlideSegment>> = vec![None; doc.slides.len()];
        for slide in &doc.slides {
            match worker.process(slide, &texts[slide.index], synthesizer, workdir, &self.cancel) {
                Ok(segment) => slots[slide.index] = Some(segment),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let failure = SlidecastError::slide_failed(slide.index, &err);
                    warn!(error = %failure, "slide dropped");
                }
            }
        }
        Ok(slots)
    }

    fn process_parallel(
        &self,
        doc: &PptxDocument,
        texts: &[String],
        synthesizer: &NarrationSynthesizer,
        workdir: &RunDir,
    ) -> SlidecastResult<Vec<Option<SlideSegment>>> {
        let pool = build_thread_pool(self.config.threads)?;
        let cancel = &self.cancel;
        let config = &self.config;

        let results: Vec<(usize, SlidecastResult<SlideSegment>)> = pool.install(|| {
            doc.slides
                .par_iter()
                .map_init(
                    || SlideWorker::new(config),
                    |worker, slide| {
                        (
                            slide.index,
                            worker.process(
                                slide,
                                &texts[slide.index],
                                synthesizer,
                                workdir,
                                cancel,
                            ),
                        )
                    },
                )
                .collect::<Vec<_>>()
        });

        let mut slots: Vec<Option<SlideSegment>> = vec![None; doc.slides.len()];
        for (index, result) in results {
            match result {
                Ok(segment) => slots[index] = Some(segment),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let failure = SlidecastError::slide_failed(index, &err);
                    warn!(error = %failure, "slide dropped");
                }
            }
        }
        Ok(slots)
    }

    /// A short "ready" presenter clip placed next to the main output.
    /// Failure here never affects the already finished video.
    fn write_closing_clip(&self, workdir: &RunDir, out_path: &Path) {
        let mut provider = AvatarProvider::from_config(&self.config);
        let result = provider.produce(
            "Your presentation is ready!",
            "closing",
            workdir.path(),
            &self.cancel,
        );
        match result {
            Ok(clip) => {
                let stem = out_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "presentation".to_string());
                let target = out_path.with_file_name(format!("{stem}_closing.mp4"));
                if let Err(err) = move_file(&clip.path, &target) {
                    warn!(error = %err, "could not place closing clip");
                } else {
                    info!(clip = %target.display(), "closing clip written");
                }
            }
            Err(err) => warn!(error = %err, "closing clip skipped"),
        }
    }
}

/// Per-worker pipeline state: each rayon worker (or the single sequential
/// worker) owns its renderer, presenter provider, and composer.
struct SlideWorker {
    renderer: SlideRenderer,
    avatar: AvatarProvider,
    composer: SlideComposer,
}

impl SlideWorker {
    fn new(config: &PipelineConfig) -> Self {
        let (width, height) = config.quality.resolution();
        Self {
            renderer: SlideRenderer::new(width, height, config.font_path.as_deref()),
            avatar: AvatarProvider::from_config(config),
            composer: SlideComposer::new(
                width,
                height,
                config.output_fps(),
                config.avatar_corner,
                config.transition,
            ),
        }
    }

    fn process(
        &mut self,
        slide: &Slide,
        text: &str,
        synthesizer: &NarrationSynthesizer,
        workdir: &RunDir,
        cancel: &CancelToken,
    ) -> SlidecastResult<SlideSegment> {
        let index = slide.index;

        cancel.check()?;
        let image =
            self.renderer
                .render_to_png(slide, &workdir.file(format!("slide_{index}.png")))?;

        cancel.check()?;
        let audio = synthesizer.synthesize(text, index, workdir.path());

        cancel.check()?;
        let avatar = self
            .avatar
            .produce(text, &format!("avatar_{index}"), workdir.path(), cancel)?;

        cancel.check()?;
        self.composer.compose(
            &image,
            &audio,
            &avatar,
            &workdir.file(format!("segment_{index}.mp4")),
        )
    }
}

/// Collapse index-addressed slots into the ordered survivor list.
fn surviving_segments(slots: Vec<Option<SlideSegment>>) -> SlidecastResult<Vec<SlideSegment>> {
    let segments: Vec<SlideSegment> = slots.into_iter().flatten().collect();
    if segments.is_empty() {
        return Err(SlidecastError::NoSlidesProcessed);
    }
    Ok(segments)
}

fn build_thread_pool(threads: Option<usize>) -> SlidecastResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| SlidecastError::validation(format!("failed to build thread pool: {e}")))
}

/// Rename, falling back to copy+remove when source and destination sit on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> SlidecastResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| {
        SlidecastError::media(format!(
            "move '{}' to '{}': {e}",
            from.display(),
            to.display()
        ))
    })?;
    std::fs::remove_file(from).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize) -> SlideSegment {
        SlideSegment {
            index,
            path: PathBuf::from(format!("/tmp/segment_{index}.mp4")),
            frames: 30,
            duration_secs: 1.0,
        }
    }

    #[test]
    fn survivors_keep_deck_order_across_gaps() {
        let slots = vec![Some(segment(0)), None, Some(segment(2)), Some(segment(3))];
        let survivors = surviving_segments(slots).unwrap();
        let indices: Vec<usize> = survivors.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
    }

    #[test]
    fn all_failed_is_no_slides_processed() {
        let err = surviving_segments(vec![None, None, None]).unwrap_err();
        assert!(matches!(err, SlidecastError::NoSlidesProcessed));
    }

    #[test]
    fn move_file_copies_across_filesystems() {
        let dir = std::env::temp_dir().join(format!(
            "slidecast_move_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let from = dir.join("a.bin");
        let to = dir.join("b.bin");
        std::fs::write(&from, b"payload").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
        std::fs::remove_dir_all(&dir).ok();
    }
}
