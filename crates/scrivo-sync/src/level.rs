//! Microphone level measurement for the recording indicator.
//!
//! Raw capture chunks arrive far faster than any surface wants to repaint,
//! so the meter throttles emission and smooths values exponentially.

use std::time::{Duration, Instant};

/// Root-mean-square and peak of one chunk of mono samples, both in [0, 1].
pub fn compute_levels(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f32;
    for &s in samples {
        let v = s.abs();
        if v > peak {
            peak = v;
        }
        sum_sq += s * s;
    }

    let rms = (sum_sq / samples.len() as f32).sqrt();
    (rms.clamp(0.0, 1.0), peak.clamp(0.0, 1.0))
}

/// Exponential smoothing with a 150ms time constant.
pub fn smooth_level(prev: f32, next: f32, dt: Duration) -> f32 {
    let tau = 0.15f32;
    let alpha = 1.0 - (-dt.as_secs_f32() / tau).exp();
    prev + (next - prev) * alpha
}

/// Stateful throttled meter fed from the audio callback.
#[derive(Debug)]
pub struct LevelMeter {
    min_interval: Duration,
    last_emit: Instant,
    smoothed_rms: f32,
    smoothed_peak: f32,
}

impl LevelMeter {
    pub fn new(min_interval: Duration) -> Self {
        // Backdate the first emission so the meter shows life immediately.
        let last_emit = Instant::now()
            .checked_sub(min_interval)
            .unwrap_or_else(Instant::now);
        Self {
            min_interval,
            last_emit,
            smoothed_rms: 0.0,
            smoothed_peak: 0.0,
        }
    }

    /// Feed one chunk. Returns smoothed `(rms, peak)` when enough time has
    /// passed since the last emission, `None` while throttled.
    pub fn sample(&mut self, chunk: &[f32]) -> Option<(f32, f32)> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_emit);
        if dt < self.min_interval {
            return None;
        }
        self.last_emit = now;

        let (rms, peak) = compute_levels(chunk);
        self.smoothed_rms = smooth_level(self.smoothed_rms, rms, dt);
        self.smoothed_peak = smooth_level(self.smoothed_peak, peak, dt);
        Some((self.smoothed_rms, self.smoothed_peak))
    }
}
