use std::time::{Duration, Instant};

/// Tracks per-origin admission state during a crawl
///
/// The coordinator keeps one of these per host and consults it before handing a
/// URL on that host to a worker.
#[derive(Debug, Clone, Default)]
pub struct OriginState {
    /// Number of requests dispatched to this origin in the current run
    pub request_count: u64,

    /// Number of workers currently fetching from this origin
    pub in_flight: usize,

    /// Earliest instant at which the next request may be dispatched
    pub next_allowed_at: Option<Instant>,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be dispatched to this origin now
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - The origin's declared concurrency ceiling
    /// * `now` - The current time instant
    pub fn can_dispatch(&self, max_concurrent: usize, now: Instant) -> bool {
        if self.in_flight >= max_concurrent {
            return false;
        }

        match self.next_allowed_at {
            Some(next) => now >= next,
            None => true,
        }
    }

    /// Records a dispatch and blocks the origin for `delay`
    pub fn record_dispatch(&mut self, now: Instant, delay: Duration) {
        self.request_count += 1;
        self.in_flight += 1;
        self.next_allowed_at = Some(now + delay);
    }

    /// Records that a worker for this origin finished
    pub fn record_completion(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Time until the politeness delay expires, `None` if it already has
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.next_allowed_at
            .filter(|next| *next > now)
            .map(|next| next - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_origin_can_dispatch() {
        let state = OriginState::new();
        assert!(state.can_dispatch(1, Instant::now()));
        assert_eq!(state.request_count, 0);
    }

    #[test]
    fn test_delay_blocks_until_expired() {
        let mut state = OriginState::new();
        let now = Instant::now();
        state.record_dispatch(now, Duration::from_millis(1000));
        state.record_completion();

        assert!(!state.can_dispatch(3, now));
        assert!(!state.can_dispatch(3, now + Duration::from_millis(500)));
        assert!(state.can_dispatch(3, now + Duration::from_millis(1000)));
    }

    #[test]
    fn test_concurrency_ceiling() {
        let mut state = OriginState::new();
        let now = Instant::now();
        state.record_dispatch(now, Duration::ZERO);
        state.record_dispatch(now, Duration::ZERO);

        assert!(!state.can_dispatch(2, now));
        assert!(state.can_dispatch(3, now));

        state.record_completion();
        assert!(state.can_dispatch(2, now));
        assert_eq!(state.request_count, 2);
    }

    #[test]
    fn test_completion_never_underflows() {
        let mut state = OriginState::new();
        state.record_completion();
        assert_eq!(state.in_flight, 0);
    }

    #[test]
    fn test_time_until_ready() {
        let mut state = OriginState::new();
        let now = Instant::now();
        assert!(state.time_until_ready(now).is_none());

        state.record_dispatch(now, Duration::from_millis(1000));
        assert_eq!(
            state.time_until_ready(now + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );
        assert!(state
            .time_until_ready(now + Duration::from_millis(1100))
            .is_none());
    }
}
