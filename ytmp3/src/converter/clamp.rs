/// Running maximum over the progress values reported by one stage.
///
/// Tools occasionally emit out-of-order or noisy values (yt-dlp restarts its
/// counter per fragment, ffmpeg reports negative times before the first
/// frame); the clamp hides those regressions. Every process invocation owns
/// its own instance.
#[derive(Debug, Clone, Default)]
pub struct MonotonicClamp {
    max: f64,
}

impl MonotonicClamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp `raw` into `[0, 100]` and return the running maximum.
    pub fn apply(&mut self, raw: f64) -> f64 {
        let value = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };
        if value > self.max {
            self.max = value;
        }
        self.max
    }

    pub fn current(&self) -> f64 {
        self.max
    }
}
