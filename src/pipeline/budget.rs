use std::time::Duration;
use tokio::time::Instant;

/// Self-imposed ceiling on a run's wall-clock time: a fraction of the
/// maximum duration the trigger allows.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    pub fn start(max_run_duration: Duration, ratio: f64) -> Self {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            1.0
        };

        Self {
            started: Instant::now(),
            limit: max_run_duration.mul_f64(ratio),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn exceeded(&self) -> bool {
        self.elapsed() > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_exceeded_after_ratio_of_max_duration() {
        let budget = TimeBudget::start(Duration::from_secs(100), 0.85);
        assert!(!budget.exceeded());

        tokio::time::advance(Duration::from_secs(80)).await;
        assert!(!budget.exceeded());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(budget.exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ratio_is_clamped() {
        let budget = TimeBudget::start(Duration::from_secs(60), 4.0);
        assert_eq!(budget.limit(), Duration::from_secs(60));

        let budget = TimeBudget::start(Duration::from_secs(60), f64::NAN);
        assert_eq!(budget.limit(), Duration::from_secs(60));
    }
}
