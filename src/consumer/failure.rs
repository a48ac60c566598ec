//! Consecutive poll failure tracking
//!
//! A run of failed polls is logged once, counted, and escalated to a
//! re-registration request when it reaches the threshold. Escalating resets the
//! run, so a queue that stays unreachable produces one request per `threshold`
//! failures.

/// What the consumer should do about one failed poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// First failure of the run; log it at warn
    pub should_log: bool,
    /// Threshold reached; request re-registration
    pub escalate: bool,
    /// Failures in the run, including this one
    pub consecutive: u32,
}

#[derive(Debug, Clone)]
pub struct FailureTracker {
    threshold: u32,
    consecutive: u32,
    logged: bool,
}

impl FailureTracker {
    /// `threshold` is clamped to at least 1
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            logged: false,
        }
    }

    pub fn record_failure(&mut self) -> FailureRecord {
        let should_log = !self.logged;
        self.logged = true;
        self.consecutive += 1;
        let consecutive = self.consecutive;

        let escalate = self.consecutive >= self.threshold;
        if escalate {
            self.reset();
        }

        FailureRecord {
            should_log,
            escalate,
            consecutive,
        }
    }

    /// Returns the length of the run that just ended
    pub fn record_success(&mut self) -> u32 {
        let ended = self.consecutive;
        self.reset();
        ended
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn reset(&mut self) {
        self.consecutive = 0;
        self.logged = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_once_at_threshold() {
        let mut tracker = FailureTracker::new(3);

        let first = tracker.record_failure();
        assert!(first.should_log);
        assert!(!first.escalate);

        let second = tracker.record_failure();
        assert!(!second.should_log);
        assert!(!second.escalate);

        let third = tracker.record_failure();
        assert!(third.escalate);
        assert_eq!(third.consecutive, 3);
        assert_eq!(tracker.consecutive(), 0);

        // The next run logs again
        assert!(tracker.record_failure().should_log);
    }

    #[test]
    fn test_success_resets_run() {
        let mut tracker = FailureTracker::new(3);
        tracker.record_failure();
        tracker.record_failure();

        assert_eq!(tracker.record_success(), 2);
        assert_eq!(tracker.consecutive(), 0);

        let record = tracker.record_failure();
        assert!(record.should_log);
        assert!(!record.escalate);
    }

    #[test]
    fn test_threshold_of_one() {
        let mut tracker = FailureTracker::new(0);
        assert_eq!(tracker.threshold(), 1);
        assert!(tracker.record_failure().escalate);
        assert!(tracker.record_failure().escalate);
    }
}
