//! ffmpeg/ffprobe subprocess plumbing.

pub mod encode;
pub mod probe;

pub use encode::{AudioInput, EncodeOpts, FrameEncoder, concat_mp4_segments, write_pcm_f32le};
pub use probe::{
    AudioPcm, MediaInfo, decode_audio_f32_stereo, decode_video_frames_rgba8, is_ffmpeg_on_path,
    is_ffprobe_on_path, probe_media,
};
