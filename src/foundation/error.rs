pub type SlidecastResult<T> = Result<T, SlidecastError>;

#[derive(thiserror::Error, Debug)]
pub enum SlidecastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("document read error: {0}")]
    DocumentRead(String),

    #[error("slide render error: {0}")]
    SlideRender(String),

    #[error("narration synthesis error: {0}")]
    Synthesis(String),

    #[error("avatar service error: {0}")]
    AvatarService(String),

    #[error("avatar service timed out after {0:.0}s")]
    AvatarTimeout(f64),

    #[error("media error: {0}")]
    Media(String),

    #[error("slide {slide} failed: {message}")]
    SlideFailed { slide: usize, message: String },

    #[error("no slides were successfully processed")]
    NoSlidesProcessed,

    #[error("cleanup error: {0}")]
    Cleanup(String),

    #[error("run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SlidecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn document_read(msg: impl Into<String>) -> Self {
        Self::DocumentRead(msg.into())
    }

    pub fn slide_render(msg: impl Into<String>) -> Self {
        Self::SlideRender(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn avatar_service(msg: impl Into<String>) -> Self {
        Self::AvatarService(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::Cleanup(msg.into())
    }

    /// Wrap any error as the failure of a specific 0-based slide index.
    pub fn slide_failed(slide: usize, err: &SlidecastError) -> Self {
        Self::SlideFailed {
            slide,
            message: err.to_string(),
        }
    }

    /// Cancellation and fatal run-level errors must not be downgraded to a
    /// per-slide failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::NoSlidesProcessed)
    }
}
