use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// No configuration has been activated yet.
    Starting,
    /// A collector is running against the active configuration.
    Running,
    /// A reload is in flight: a standby collector is being health-checked.
    Reloading,
    /// The collector has failed to reach a healthy state repeatedly within
    /// the crash-loop window; the supervisor stops attempting reloads until
    /// a new configuration is submitted.
    Degraded,
    /// Shutting down or shut down.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub current_version: Option<u64>,
    pub collector_pid: Option<u32>,
    pub consecutive_failures: u32,
}

/// Tracks reload failures in a sliding window so a handful of failures
/// spread over days don't trip crash-loop detection the way a handful in
/// the same minute should.
pub struct CrashLoopTracker {
    window: Duration,
    threshold: u32,
    failures: Vec<SystemTime>,
}

impl CrashLoopTracker {
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self {
            window,
            threshold,
            failures: Vec::new(),
        }
    }

    /// Records a failure at `now` and reports whether the crash-loop
    /// threshold has now been crossed.
    pub fn record_failure(&mut self, now: SystemTime) -> bool {
        self.failures.retain(|&t| now.duration_since(t).map(|d| d < self.window).unwrap_or(false));
        self.failures.push(now);
        self.failures.len() as u32 >= self.threshold
    }

    pub fn reset(&mut self) {
        self.failures.clear();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures_within_window() {
        let mut tracker = CrashLoopTracker::new(Duration::from_secs(60), 3);
        let base = SystemTime::now();
        assert!(!tracker.record_failure(base));
        assert!(!tracker.record_failure(base));
        assert!(tracker.record_failure(base));
    }

    #[test]
    fn old_failures_fall_out_of_the_window() {
        let mut tracker = CrashLoopTracker::new(Duration::from_secs(60), 2);
        let base = SystemTime::now();
        assert!(!tracker.record_failure(base));
        let later = base + Duration::from_secs(120);
        assert!(!tracker.record_failure(later));
    }

    #[test]
    fn reset_clears_history() {
        let mut tracker = CrashLoopTracker::new(Duration::from_secs(60), 1);
        let now = SystemTime::now();
        assert!(tracker.record_failure(now));
        tracker.reset();
        assert_eq!(tracker.consecutive_failures(), 0);
    }
}
