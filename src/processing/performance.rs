//! Performance metrics for pipeline runs

use std::time::Duration;

/// Wall time spent in one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: String,
    pub duration: Duration,
}

impl StageTiming {
    pub fn new<S: Into<String>>(stage: S, duration: Duration) -> Self {
        Self { stage: stage.into(), duration }
    }

    pub fn millis(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Per-job processing metrics.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub processing_time_seconds: f64,
    pub input_duration_seconds: f64,
    /// Processing time divided by audio duration; below 1.0 is faster than real time.
    pub real_time_factor: f64,
    pub stage_timings: Vec<StageTiming>,
}

impl PerformanceMetrics {
    pub fn new(processing_time: Duration, input_duration_seconds: f64, stage_timings: Vec<StageTiming>) -> Self {
        let processing_time_seconds = processing_time.as_secs_f64();
        let real_time_factor = if input_duration_seconds > 0.0 {
            processing_time_seconds / input_duration_seconds
        } else {
            0.0
        };

        Self { processing_time_seconds, input_duration_seconds, real_time_factor, stage_timings }
    }

    /// Total time spent inside pipeline stages.
    pub fn stage_time(&self) -> Duration {
        self.stage_timings.iter().map(|t| t.duration).sum()
    }

    /// Stage that took the longest, if any ran.
    pub fn slowest_stage(&self) -> Option<&StageTiming> {
        self.stage_timings.iter().max_by_key(|t| t.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_time_factor() {
        let metrics = PerformanceMetrics::new(Duration::from_millis(500), 2.0, vec![]);
        assert!((metrics.real_time_factor - 0.25).abs() < 1e-9);

        let empty = PerformanceMetrics::new(Duration::from_millis(5), 0.0, vec![]);
        assert_eq!(empty.real_time_factor, 0.0);
    }

    #[test]
    fn test_stage_aggregation() {
        let metrics = PerformanceMetrics::new(
            Duration::from_millis(40),
            1.0,
            vec![
                StageTiming::new("noise_reduction", Duration::from_millis(30)),
                StageTiming::new("loudness", Duration::from_millis(2)),
            ],
        );
        assert_eq!(metrics.stage_time(), Duration::from_millis(32));
        assert_eq!(metrics.slowest_stage().unwrap().stage, "noise_reduction");
        assert!((metrics.stage_timings[1].millis() - 2.0).abs() < 1e-9);
    }
}
