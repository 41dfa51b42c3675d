//! Throughput estimation.
//!
//! [`RateEstimator`] turns a stream of `(progress, elapsed)` samples into a smoothed
//! items-per-second figure using an exponential moving average, and derives the
//! predicted total duration of the job from it.
//!
//! All arithmetic is guarded: a zero time delta never divides, a non-positive or
//! non-finite rate yields an unknown duration, and durations too large for
//! [`Duration`] collapse to unknown as well.

use std::time::Duration;

/// Smoothing factors closer to zero than this are treated as "no smoothing".
const TOLERANCE: f64 = 1e-6;

/// Exponentially smoothed rate estimator.
#[derive(Clone, Debug)]
pub struct RateEstimator {
    smoothing: f64,
    rate: Option<f64>,
    last_progress: u64,
    last_elapsed: Duration,
}

impl RateEstimator {
    /// Creates an estimator.
    ///
    /// `initial_progress` is the count the job started from; it is not counted as
    /// throughput.
    #[must_use]
    pub const fn new(smoothing: f64, initial_progress: u64) -> Self {
        Self {
            smoothing,
            rate: None,
            last_progress: initial_progress,
            last_elapsed: Duration::ZERO,
        }
    }

    /// Feeds one sample and returns the updated rate, in items per second.
    ///
    /// With a smoothing factor of zero the rate is simply `progress / elapsed`.
    /// Otherwise the instantaneous rate since the previous sample is folded into the
    /// running EMA; the first sample seeds the EMA directly.
    pub fn sample(&mut self, progress: u64, elapsed: Duration) -> f64 {
        if self.smoothing.abs() < TOLERANCE {
            let secs = elapsed.as_secs_f64();
            let rate = if secs > 0.0 {
                progress as f64 / secs
            } else {
                0.0
            };
            self.rate = Some(rate);
        } else if let Some(dt) = elapsed.checked_sub(self.last_elapsed).filter(|d| !d.is_zero()) {
            let dp = progress.saturating_sub(self.last_progress) as f64;
            let instant = dp / dt.as_secs_f64();
            let rate = match self.rate {
                Some(prev) => self.smoothing.mul_add(instant, (1.0 - self.smoothing) * prev),
                None => instant,
            };
            self.rate = Some(rate);
        } else {
            // No time has passed: keep accumulating against the previous sample.
            return self.rate();
        }

        self.last_progress = progress;
        self.last_elapsed = elapsed;
        self.rate()
    }

    /// The current rate estimate; `0.0` before any usable sample.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }

    /// Predicted duration of the whole job, or `None` when it cannot be known.
    #[must_use]
    pub fn predict_total(&self, total: u64) -> Option<Duration> {
        predict_total(total, self.rate())
    }
}

/// `total / rate` as a duration, or `None` when the rate is unusable or the result
/// does not fit in a [`Duration`].
#[must_use]
pub fn predict_total(total: u64, rate: f64) -> Option<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(total as f64 / rate).ok()
}
