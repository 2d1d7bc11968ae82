//! Frame timing and mixer metrics

use std::collections::VecDeque;
use std::time::Duration;

/// Frame timing statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Average frame time in milliseconds
    pub avg_ms: f64,
    /// Minimum frame time in milliseconds
    pub min_ms: f64,
    /// Maximum frame time in milliseconds
    pub max_ms: f64,
    /// 50th percentile (median) frame time
    pub p50_ms: f64,
    /// 95th percentile frame time
    pub p95_ms: f64,
    /// 99th percentile frame time
    pub p99_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Rolling window of frame durations.
///
/// Fed with the `dt` of every mixer update, so the statistics describe the
/// frame pacing seen by the scene animations.
#[derive(Debug)]
pub struct FrameProfiler {
    frame_times: VecDeque<Duration>,
    /// Maximum samples to keep (5 seconds at 60fps)
    max_samples: usize,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self::with_capacity(300)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record the duration of one frame
    pub fn record_frame(&mut self, duration: Duration) {
        self.frame_times.push_back(duration);
        if self.frame_times.len() > self.max_samples {
            self.frame_times.pop_front();
        }
    }

    /// Get frame timing statistics
    pub fn stats(&self) -> FrameStats {
        if self.frame_times.is_empty() {
            return FrameStats::default();
        }

        let mut times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        times.sort_by(f64::total_cmp);

        let sum: f64 = times.iter().sum();
        let count = times.len() as f64;

        FrameStats {
            avg_ms: sum / count,
            min_ms: times.first().copied().unwrap_or(0.0),
            max_ms: times.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&times, 0.50),
            p95_ms: percentile(&times, 0.95),
            p99_ms: percentile(&times, 0.99),
            sample_count: times.len(),
        }
    }

    /// Frames per second over the window
    pub fn fps(&self) -> f64 {
        let seconds: f64 = self.frame_times.iter().map(Duration::as_secs_f64).sum();
        if seconds > 0.0 {
            self.frame_times.len() as f64 / seconds
        } else {
            0.0
        }
    }

    /// Get the last frame time in milliseconds
    pub fn last_frame_time_ms(&self) -> f64 {
        self.frame_times
            .back()
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Calculate percentile from sorted array
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}

/// Snapshot of the mixer state for status displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixerMetrics {
    pub frame_stats: FrameStats,
    pub fps: f64,
    /// Sources in the session
    pub source_count: usize,
    /// Primitives drawn into the output by the last update
    pub output_primitives: usize,
    /// Name of the source that failed during the last update
    pub failed_source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_profiler() {
        let mut profiler = FrameProfiler::new();
        for ms in [10, 20, 30, 40] {
            profiler.record_frame(Duration::from_millis(ms));
        }

        let stats = profiler.stats();
        assert!((stats.avg_ms - 25.0).abs() < 1e-9);
        assert_eq!(stats.min_ms, 10.0);
        assert_eq!(stats.max_ms, 40.0);
        assert_eq!(stats.sample_count, 4);
        assert!((profiler.fps() - 40.0).abs() < 1e-9);
        assert_eq!(profiler.last_frame_time_ms(), 40.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut profiler = FrameProfiler::with_capacity(3);
        for ms in 1..=5 {
            profiler.record_frame(Duration::from_millis(ms));
        }
        let stats = profiler.stats();
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.min_ms, 3.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 0.5), 5.0); // Median
        assert_eq!(percentile(&values, 0.0), 1.0); // Min
        assert_eq!(percentile(&values, 1.0), 10.0); // Max
    }

    #[test]
    fn test_saturated_frame_time() {
        let mut profiler = FrameProfiler::new();
        profiler.record_frame(Duration::MAX);
        profiler.record_frame(Duration::MAX);
        assert!(profiler.fps() < 1e-9);
        assert!(profiler.stats().max_ms > 0.0);
    }

    #[test]
    fn test_empty_profiler() {
        let profiler = FrameProfiler::default();
        assert_eq!(profiler.stats(), FrameStats::default());
        assert_eq!(profiler.fps(), 0.0);
    }
}
