//! Hardware timestamp continuity monitor
//!
//! The probe clock ticks at 100 kHz while frames arrive at 30 kHz, so
//! consecutive timestamps differ by 3 or 4. Larger increments below the
//! headstage clock-reset threshold indicate lost packets.

use contracts::TimingConfig;

/// A discontinuity in the hardware timestamp stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampJump {
    /// Observed increment in clock ticks
    pub jump: u32,
    /// Sample number of the frame after the gap
    pub sample_number: i64,
}

/// Tracks the last hardware timestamp of one stream
#[derive(Debug, Clone)]
pub struct TimestampMonitor {
    timing: TimingConfig,
    last: u32,
    passed_startup_grace: bool,
}

impl TimestampMonitor {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            last: 0,
            passed_startup_grace: false,
        }
    }

    /// Forget all history (acquisition start)
    pub fn reset(&mut self) {
        self.last = 0;
        self.passed_startup_grace = false;
    }

    #[inline]
    pub fn passed_startup_grace(&self) -> bool {
        self.passed_startup_grace
    }

    /// Record `timestamp` and report a jump from the previous one
    #[inline]
    pub fn observe(&mut self, timestamp: u32, sample_number: i64) -> Option<TimestampJump> {
        let jump = timestamp.wrapping_sub(self.last);
        self.last = timestamp;

        let reportable = self.passed_startup_grace
            && jump > self.timing.allowable_jump
            && jump < self.timing.max_headstage_clock_jump;
        reportable.then_some(TimestampJump {
            jump,
            sample_number,
        })
    }

    /// Called once per polling cycle with the next AP sample number
    pub fn end_of_cycle(&mut self, sample_number: i64) {
        if sample_number > self.timing.startup_grace_samples {
            self.passed_startup_grace = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_past_grace() -> TimestampMonitor {
        let mut monitor = TimestampMonitor::new(TimingConfig {
            startup_grace_samples: 10,
            ..Default::default()
        });
        monitor.end_of_cycle(11);
        monitor
    }

    #[test]
    fn test_nominal_increments_never_reported() {
        let mut monitor = monitor_past_grace();
        let mut ts = 0u32;
        for i in 0..300 {
            ts = ts.wrapping_add(if i % 3 == 2 { 4 } else { 3 });
            assert_eq!(monitor.observe(ts, i), None);
        }
    }

    #[test]
    fn test_jump_reported_with_sample_number() {
        let mut monitor = monitor_past_grace();
        monitor.observe(100, 0);
        let jump = monitor.observe(150, 42).unwrap();
        assert_eq!(jump.jump, 50);
        assert_eq!(jump.sample_number, 42);
        assert_eq!(monitor.observe(153, 43), None);
    }

    #[test]
    fn test_jump_ignored_during_grace() {
        let mut monitor = TimestampMonitor::new(TimingConfig::default());
        monitor.observe(100, 0);
        assert_eq!(monitor.observe(150, 1), None);

        monitor.end_of_cycle(30_000);
        assert!(!monitor.passed_startup_grace());
        monitor.end_of_cycle(30_001);
        assert!(monitor.passed_startup_grace());
    }

    #[test]
    fn test_wraparound_is_continuous() {
        let mut monitor = monitor_past_grace();
        monitor.observe(u32::MAX - 1, 0);
        assert_eq!(monitor.observe(2, 1), None);
    }

    #[test]
    fn test_clock_reset_not_reported() {
        let mut monitor = monitor_past_grace();
        monitor.observe(10, 0);
        assert_eq!(monitor.observe(10 + 3_221_225_475, 1), None);
        assert!(monitor.observe(10 + 3_221_225_475 + 100, 2).is_some());
    }

    #[test]
    fn test_reset_restarts_grace() {
        let mut monitor = monitor_past_grace();
        monitor.reset();
        assert!(!monitor.passed_startup_grace());
        monitor.observe(500, 0);
        assert_eq!(monitor.observe(600, 1), None);
    }
}
