use crate::foundation::error::{SlidecastError, SlidecastResult};

pub use kurbo::Affine;

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32, // must be > 0
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> SlidecastResult<Self> {
        if den == 0 {
            return Err(SlidecastError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(SlidecastError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to frame count, rounding to nearest.
    ///
    /// Segment lengths are derived from narration duration, so rounding (not
    /// floor) keeps video and audio within half a frame of each other.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

/// Exact PCM sample offset for a frame boundary, using rational FPS math so
/// long timelines never drift.
pub fn frame_to_sample(frame_delta: u64, fps: Fps, sample_rate: u32) -> u64 {
    let num = u128::from(frame_delta) * u128::from(sample_rate) * u128::from(fps.den);
    let den = u128::from(fps.num);
    ((num + (den / 2)) / den) as u64
}

/// Cooperative cancellation flag shared across the pipeline and any poll
/// loops. Cancellation is observed at stage boundaries; in-flight subprocess
/// work finishes first.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Err(`Cancelled`) once the token is set.
    pub fn check(&self) -> SlidecastResult<()> {
        if self.is_cancelled() {
            Err(SlidecastError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Convert one straight-alpha channel value to premultiplied.
pub fn premul_channel(c: u8, a: u8) -> u8 {
    let c = u16::from(c);
    let a = u16::from(a);
    (((c * a) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero() {
        assert!(Fps::new(30, 0).is_err());
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 1).is_ok());
    }

    #[test]
    fn frames_round_trip_through_seconds() {
        let fps = Fps { num: 30, den: 1 };
        assert_eq!(fps.secs_to_frames_round(fps.frames_to_secs(91)), 91);
        assert_eq!(fps.secs_to_frames_round(1.0), 30);
        // 2.5s of narration is exactly 75 frames at 30fps
        assert_eq!(fps.secs_to_frames_round(2.5), 75);
    }

    #[test]
    fn secs_to_frames_rounds_to_nearest() {
        let fps = Fps { num: 30, den: 1 };
        // 1.016s * 30 = 30.48 -> 30; 1.02s * 30 = 30.6 -> 31
        assert_eq!(fps.secs_to_frames_round(1.016), 30);
        assert_eq!(fps.secs_to_frames_round(1.02), 31);
        assert_eq!(fps.secs_to_frames_round(-1.0), 0);
    }

    #[test]
    fn frame_to_sample_uses_rational_fps() {
        // 30000/1001 ~ 29.97
        let fps = Fps {
            num: 30_000,
            den: 1001,
        };
        let s0 = frame_to_sample(0, fps, 48_000);
        let s1 = frame_to_sample(1, fps, 48_000);
        assert_eq!(s0, 0);
        assert!(s1 > 0);

        // Integer fps stays exact.
        let fps = Fps { num: 30, den: 1 };
        assert_eq!(frame_to_sample(30, fps, 48_000), 48_000);
        assert_eq!(frame_to_sample(75, fps, 48_000), 120_000);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(SlidecastError::Cancelled)));
    }

    #[test]
    fn premul_channel_matches_rounding() {
        assert_eq!(premul_channel(255, 255), 255);
        assert_eq!(premul_channel(255, 0), 0);
        assert_eq!(premul_channel(128, 128), 64);
    }
}
