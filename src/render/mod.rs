//! CPU rasterization of slides and presenter frames.

pub mod raster;
pub mod slide;
pub mod text;

pub use slide::{RenderedImage, SlideRenderer};
