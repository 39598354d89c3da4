//! MP4 encoding by streaming raw frames into a spawned `ffmpeg`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::foundation::core::Fps;
use crate::foundation::error::{SlidecastError, SlidecastResult};

/// Side-channel PCM fed to ffmpeg as a second input.
#[derive(Clone, Debug)]
pub struct AudioInput {
    /// Raw `f32le` interleaved PCM file.
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Options for one encoded MP4.
#[derive(Clone, Debug)]
pub struct EncodeOpts {
    pub out_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub audio: Option<AudioInput>,
}

/// Streams premultiplied RGBA8 frames into `ffmpeg` and muxes the optional
/// PCM side input. Frames are flattened to opaque RGBA before writing since
/// ffmpeg's `rgba` raw input is straight alpha.
pub struct FrameEncoder {
    opts: EncodeOpts,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    scratch: Vec<u8>,
    frames_pushed: u64,
}

impl FrameEncoder {
    pub fn start(opts: EncodeOpts) -> SlidecastResult<Self> {
        if opts.width == 0 || opts.height == 0 {
            return Err(SlidecastError::validation(
                "encoder width/height must be non-zero",
            ));
        }
        if !opts.width.is_multiple_of(2) || !opts.height.is_multiple_of(2) {
            return Err(SlidecastError::validation(
                "encoder width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        ensure_parent_dir(&opts.out_path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", opts.width, opts.height),
            // Input framerate for rawvideo must precede `-i`.
            "-r",
            &format!("{}/{}", opts.fps.num, opts.fps.den),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = opts.audio.as_ref() {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(SlidecastError::validation(
                    "audio sample_rate/channels must be non-zero",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
                "-movflags",
                "+faststart",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        cmd.arg(&opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            SlidecastError::media(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SlidecastError::media("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SlidecastError::media("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let scratch = vec![0u8; opts.width as usize * opts.height as usize * 4];
        Ok(Self {
            opts,
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            scratch,
            frames_pushed: 0,
        })
    }

    /// Push one premultiplied RGBA8 frame.
    pub fn push_frame(&mut self, premul_rgba8: &[u8]) -> SlidecastResult<()> {
        if premul_rgba8.len() != self.scratch.len() {
            return Err(SlidecastError::validation(format!(
                "frame size mismatch: got {} bytes, expected {}",
                premul_rgba8.len(),
                self.scratch.len()
            )));
        }

        flatten_premul_over_bg(&mut self.scratch, premul_rgba8, [0, 0, 0]);

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SlidecastError::media("encoder is already finalized"));
        };
        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            SlidecastError::media(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames_pushed += 1;
        Ok(())
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    /// Close stdin and wait for ffmpeg to finish the file.
    pub fn finish(mut self) -> SlidecastResult<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| SlidecastError::media(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlidecastError::media("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| SlidecastError::media(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(SlidecastError::media(format!(
                "ffmpeg exited with status {} for '{}': {}",
                status,
                self.opts.out_path.display(),
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

/// Concatenate finished MP4 segments without re-encoding, through ffmpeg's
/// concat demuxer. All segments must share codec parameters, which holds
/// here because every segment comes out of [`FrameEncoder`] with one
/// configuration.
pub fn concat_mp4_segments(
    segments: &[PathBuf],
    list_path: &Path,
    out_path: &Path,
) -> SlidecastResult<()> {
    if segments.is_empty() {
        return Err(SlidecastError::validation("no segments to concatenate"));
    }
    ensure_parent_dir(out_path)?;

    let mut list = String::new();
    for path in segments {
        list.push_str(&concat_list_line(path)?);
    }
    std::fs::write(list_path, list).map_err(|e| {
        SlidecastError::media(format!("write concat list '{}': {e}", list_path.display()))
    })?;

    let out = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
        .arg(list_path)
        .args(["-c", "copy", "-movflags", "+faststart"])
        .arg(out_path)
        .output()
        .map_err(|e| SlidecastError::media(format!("failed to run ffmpeg for concat: {e}")))?;
    if !out.status.success() {
        return Err(SlidecastError::media(format!(
            "ffmpeg concat failed for '{}': {}",
            out_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// One `file '...'` line for the concat demuxer, with single quotes escaped
/// the way the demuxer expects (`'\''`).
fn concat_list_line(path: &Path) -> SlidecastResult<String> {
    let text = path
        .to_str()
        .ok_or_else(|| SlidecastError::validation("segment path is not valid UTF-8"))?;
    Ok(format!("file '{}'\n", text.replace('\'', r"'\''")))
}

/// Write interleaved `f32` PCM as raw little-endian bytes.
pub fn write_pcm_f32le(path: &Path, interleaved: &[f32]) -> SlidecastResult<()> {
    let mut bytes = Vec::with_capacity(interleaved.len() * 4);
    for sample in interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(path, bytes)
        .map_err(|e| SlidecastError::media(format!("write pcm '{}': {e}", path.display())))
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SlidecastResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Flatten premultiplied RGBA8 over an opaque background.
fn flatten_premul_over_bg(dst: &mut [u8], src_premul: &[u8], bg_rgb: [u8; 3]) {
    debug_assert_eq!(dst.len(), src_premul.len());
    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255u16 - a;
        for c in 0..3 {
            let blended = s[c] as u16 + ((bg_rgb[c] as u16 * inv + 127) / 255);
            d[c] = blended.min(255) as u8;
        }
        d[3] = 255;
    }
}
