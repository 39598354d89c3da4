//! slidecast turns a slide deck into a narrated presentation video.
//!
//! The pipeline extracts slides from a `.pptx` file, rasters each slide,
//! synthesizes narration for its text, produces a presenter clip, composes
//! the three into a per-slide MP4 segment, and concatenates the segments
//! into the final video. A failed slide is dropped with a warning; the run
//! only fails outright when the deck is unreadable, the run is cancelled,
//! or no slide survives.

#![forbid(unsafe_code)]

pub mod assemble;
pub mod avatar;
pub mod compose;
pub mod config;
pub mod deck;
pub mod foundation;
pub mod media;
pub mod render;
pub mod script;
pub mod speech;
pub mod workdir;

pub use assemble::{Assembler, RunReport};
pub use config::{
    AvatarCorner, AvatarStyle, PipelineConfig, Transition, VideoQuality, VoiceType,
};
pub use deck::PptxDocument;
pub use foundation::core::{CancelToken, Fps};
pub use foundation::error::{SlidecastError, SlidecastResult};
