//! Simulated clock.

use std::time::Duration;

use tokio::time::Instant;

/// Offset used for seconds too far out to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Read-only clock reporting whole seconds since simulation start.
///
/// Backed by the tokio clock, so a paused runtime drives simulated time
/// without real waiting. Cheap to copy; every worker holds its own copy of
/// the same start instant.
#[derive(Debug, Clone, Copy)]
pub struct SimulationClock {
    start: Instant,
}

impl SimulationClock {
    /// Starts a clock at the current instant.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns whole seconds elapsed since simulation start.
    pub fn now(&self) -> u64 {
        self.elapsed().as_secs()
    }

    /// Returns exact time elapsed since simulation start.
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.start)
    }

    /// Returns the instant at which simulated second `second` begins.
    ///
    /// Seconds beyond what an instant can hold map to a point decades away.
    pub fn instant_at(&self, second: u64) -> Instant {
        self.start + Duration::from_secs(second).min(FAR_FUTURE)
    }

    /// Sleeps until the clock reads at least `second`.
    pub async fn sleep_until_second(&self, second: u64) {
        tokio::time::sleep_until(self.instant_at(second)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_reports_whole_seconds() {
        let clock = SimulationClock::start();
        assert_eq!(clock.now(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(clock.now(), 1);
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.now(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_second() {
        let clock = SimulationClock::start();
        clock.sleep_until_second(7).await;
        assert_eq!(clock.now(), 7);

        // Already passed seconds return immediately
        clock.sleep_until_second(3).await;
        assert_eq!(clock.now(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copies_share_start() {
        let clock = SimulationClock::start();
        let copy = clock;
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(clock.now(), copy.now());
        assert_eq!(clock.instant_at(4), copy.instant_at(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_second_is_clamped() {
        let clock = SimulationClock::start();

        let far = clock.instant_at(u64::MAX);
        assert!(far > clock.instant_at(86_400 * 365));
        assert_eq!(far, clock.instant_at(u64::MAX - 1));
    }
}
