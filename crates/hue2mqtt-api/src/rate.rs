//! Fixed-window request admission.
//!
//! A [`RateWindow`] counts requests against one endpoint of one host.
//! Bursts up to `max_requests` are admitted at the start of a window;
//! anything beyond that is refused until the window rolls over. This is
//! deliberately not a sliding window or leaky bucket.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Upper bound for any single admission or retry-after sleep.
pub const MAX_SLEEP_MS: i64 = 2000;

// ── RatePolicy ───────────────────────────────────────────────────────

/// Requests allowed per window, and the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub interval: Duration,
}

impl RatePolicy {
    pub const fn new(max_requests: u32, interval_ms: u64) -> Self {
        Self {
            max_requests,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::new(10, 1000)
    }
}

// ── RateWindow ───────────────────────────────────────────────────────

/// Admission counter for one `(host, endpoint key)` pair.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window_start: Instant,
    count: u32,
    policy: RatePolicy,
    admit: bool,
}

impl RateWindow {
    pub fn new(policy: RatePolicy, now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            policy,
            admit: true,
        }
    }

    /// Count `n` requests at `now` and decide whether they are admitted.
    ///
    /// `count` only grows within a window, refused requests included;
    /// it resets when more than `interval` has elapsed since the window
    /// started.
    pub fn check_and_admit(&mut self, now: Instant, n: u32) -> bool {
        if now.saturating_duration_since(self.window_start) > self.policy.interval {
            self.window_start = now;
            self.count = n;
            self.admit = true;
        } else if self.count < self.policy.max_requests {
            self.count = self.count.saturating_add(n);
            self.admit = true;
        } else {
            self.count = self.count.saturating_add(n);
            self.admit = false;
        }
        self.admit
    }

    /// Earliest instant at which the current window counts as rolled over.
    pub fn rollover_at(&self) -> Instant {
        self.window_start + self.policy.interval + Duration::from_millis(1)
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn admitted(&self) -> bool {
        self.admit
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }
}

// ── Sleeping ─────────────────────────────────────────────────────────

/// Sleep for `ms` milliseconds, refusing values outside `0..=MAX_SLEEP_MS`.
///
/// A refused sleep is logged and returns immediately with `false`.
pub async fn clamped_sleep(ms: i64) -> bool {
    if !(0..=MAX_SLEEP_MS).contains(&ms) {
        warn!(ms, max_ms = MAX_SLEEP_MS, "refusing out-of-range sleep");
        return false;
    }
    let ms = u64::try_from(ms).unwrap_or_default();
    tokio::time::sleep(Duration::from_millis(ms)).await;
    true
}

/// Wait until `deadline` in slices no longer than [`MAX_SLEEP_MS`].
pub async fn sleep_until(deadline: Instant) {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        let ms = i64::try_from(remaining.as_millis())
            .unwrap_or(MAX_SLEEP_MS)
            .clamp(1, MAX_SLEEP_MS);
        clamped_sleep(ms).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn admits_burst_up_to_max() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(RatePolicy::new(3, 1000), t0);

        assert!(window.check_and_admit(t0, 1));
        assert!(window.check_and_admit(t0 + ms(10), 1));
        assert!(window.check_and_admit(t0 + ms(20), 1));
        assert!(!window.check_and_admit(t0 + ms(30), 1));
        assert_eq!(window.count(), 4);
    }

    #[test]
    fn count_never_decreases_within_window() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(RatePolicy::default(), t0);
        let mut last = 0;

        for i in 0..25 {
            let admitted = window.check_and_admit(t0 + ms(i * 10), 1);
            assert!(window.count() >= last);
            if last >= 10 {
                assert!(!admitted, "call {i} admitted with count {last}");
            }
            last = window.count();
        }
    }

    #[test]
    fn window_rolls_over_after_interval() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(RatePolicy::new(10, 1000), t0);

        assert!(window.check_and_admit(t0, 1));
        assert_eq!(window.count(), 1);

        let t1 = t0 + ms(1500);
        assert!(window.check_and_admit(t1, 1));
        assert_eq!(window.window_start(), t1);
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn exact_interval_boundary_does_not_roll_over() {
        let t0 = Instant::now();
        let mut window = RateWindow::new(RatePolicy::new(1, 1000), t0);

        assert!(window.check_and_admit(t0, 1));
        assert!(!window.check_and_admit(t0 + ms(1000), 1));
        assert!(window.check_and_admit(window.rollover_at(), 1));
    }

    #[tokio::test(start_paused = true)]
    async fn clamped_sleep_rejects_out_of_range() {
        let start = Instant::now();
        assert!(!clamped_sleep(-1).await);
        assert!(!clamped_sleep(2001).await);
        assert_eq!(Instant::now(), start);

        assert!(clamped_sleep(2000).await);
        let slept = Instant::now() - start;
        assert!(slept >= ms(2000) && slept < ms(2010), "slept {slept:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_waits_past_clamp_in_slices() {
        let start = Instant::now();
        sleep_until(start + ms(4500)).await;
        assert!(Instant::now() - start >= ms(4500));
    }
}
