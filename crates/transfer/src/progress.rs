use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default minimum gap between two progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// ProgressThrottle
// ---------------------------------------------------------------------------

/// Rate-limits progress notifications to one per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// A zero interval lets every notification through.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns `true` (and restarts the interval) if a notification may be
    /// sent now.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        let ready = self.interval.is_zero()
            || self
                .last
                .is_none_or(|last| now.duration_since(last) >= self.interval);
        if ready {
            self.last = Some(now);
        }
        ready
    }

    /// Records a notification sent regardless of the interval.
    pub fn mark_sent(&mut self) {
        self.last = Some(Instant::now());
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a sample of `bytes` acknowledged at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.lock();
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.lock();
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn throttle_zero_interval_always_ready() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.ready());
        assert!(throttle.ready());
    }

    #[test]
    fn throttle_blocks_within_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));
        assert!(throttle.ready());
        assert!(!throttle.ready());
    }

    #[test]
    fn throttle_reopens_after_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(20));
        assert!(throttle.ready());
        std::thread::sleep(Duration::from_millis(40));
        assert!(throttle.ready());
    }

    #[test]
    fn throttle_mark_sent_restarts_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));
        throttle.mark_sent();
        assert!(!throttle.ready());
    }

    #[test]
    fn speed_calculator_no_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_calculator_single_sample() {
        let calc = SpeedCalculator::default();
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_calculator_multiple_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(500);

        // Timing is imprecise; only the sign is stable.
        assert!(calc.bytes_per_second() > 0.0);
    }

    #[test]
    fn speed_calculator_max_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.lock().samples.len() <= 5);
    }

    #[test]
    fn speed_calculator_concurrent_access() {
        let calc = Arc::new(SpeedCalculator::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&calc);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        c.add_sample(1);
                        let _ = c.bytes_per_second();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        let _ = calc.bytes_per_second();
    }
}
