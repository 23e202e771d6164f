use std::time::Duration;

/// Edge-triggered idleness detector. A threshold crossing is reported once;
/// the user has to come back (or monitoring has to restart) before another
/// crossing can fire.
pub struct IdleEvaluator {
    threshold: Duration,
    latched: bool,
}

impl IdleEvaluator {
    pub fn new(threshold: Duration) -> IdleEvaluator {
        IdleEvaluator {
            threshold,
            latched: false,
        }
    }

    pub fn set_threshold(&mut self, threshold: Duration) {
        if threshold != self.threshold {
            self.threshold = threshold;
            self.latched = false;
        }
    }

    /// Feeds one idle reading. True exactly when this reading crosses the
    /// threshold from below.
    pub fn observe(&mut self, idle: Duration) -> bool {
        if idle < self.threshold {
            self.latched = false;
            return false;
        }
        if self.latched {
            return false;
        }
        self.latched = true;
        true
    }

    pub fn reset(&mut self) {
        self.latched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn fires_once_while_idle_persists() {
        let mut evaluator = IdleEvaluator::new(secs(60));
        assert!(!evaluator.observe(secs(10)));
        assert!(evaluator.observe(secs(65)));
        assert!(!evaluator.observe(secs(70)));
        assert!(!evaluator.observe(secs(500)));
    }

    #[test]
    fn refires_after_activity_returns() {
        let mut evaluator = IdleEvaluator::new(secs(60));
        assert!(evaluator.observe(secs(60)));
        assert!(!evaluator.observe(secs(5)));
        assert!(evaluator.observe(secs(61)));
    }

    #[test]
    fn reset_forgets_the_crossing() {
        let mut evaluator = IdleEvaluator::new(secs(60));
        assert!(evaluator.observe(secs(65)));
        evaluator.reset();
        assert!(evaluator.observe(secs(65)));
    }

    #[test]
    fn changing_the_threshold_starts_fresh() {
        let mut evaluator = IdleEvaluator::new(secs(60));
        assert!(evaluator.observe(secs(65)));
        evaluator.set_threshold(secs(30));
        assert!(evaluator.observe(secs(65)));
    }
}
