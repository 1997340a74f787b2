// Per-host call bookkeeping.
//
// One `CallState` exists per remote host for the lifetime of the process.
// It is owned by that host's worker task inside the ApiClient and is never
// shared with other components.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::client::Body;
use crate::rate::{RatePolicy, RateWindow};

/// Endpoint key used when no path-specific rate policy applies.
pub const DEFAULT_ENDPOINT: &str = "default";

#[derive(Debug)]
pub struct CallState {
    host: String,
    windows: HashMap<String, RateWindow>,
    last_error: Option<String>,
    succeeded: bool,
    next_allowed_at: Option<Instant>,
    last_body: Option<Body>,
}

impl CallState {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            windows: HashMap::new(),
            last_error: None,
            succeeded: false,
            next_allowed_at: None,
            last_body: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolve or lazily create the window for `key`.
    pub fn window(&mut self, key: &str, policy: RatePolicy, now: Instant) -> &mut RateWindow {
        self.windows
            .entry(key.to_owned())
            .or_insert_with(|| RateWindow::new(policy, now))
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    // ── Retry-after ──────────────────────────────────────────────────

    /// Record a 429 deadline.
    pub fn defer_until(&mut self, deadline: Instant) {
        self.next_allowed_at = Some(deadline);
    }

    /// The pending retry-after deadline, if it is still in the future.
    pub fn pending_deferral(&self, now: Instant) -> Option<Instant> {
        self.next_allowed_at.filter(|at| *at > now)
    }

    /// Forget the retry-after deadline once it has been honored.
    pub fn clear_deferral(&mut self) {
        self.next_allowed_at = None;
    }

    // ── Outcome tracking ─────────────────────────────────────────────

    pub fn record_success(&mut self, body: Body) {
        self.succeeded = true;
        self.last_body = Some(body);
    }

    pub fn record_error(&mut self, message: String) {
        self.succeeded = false;
        self.last_error = Some(message);
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_body(&self) -> Option<&Body> {
        self.last_body.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn windows_are_created_once_per_key() {
        let now = Instant::now();
        let mut state = CallState::new("10.0.0.2");

        state.window(DEFAULT_ENDPOINT, RatePolicy::default(), now).check_and_admit(now, 1);
        state.window(DEFAULT_ENDPOINT, RatePolicy::default(), now).check_and_admit(now, 1);
        state
            .window("/clip/v2/resource/grouped_light/g1", RatePolicy::new(1, 1000), now)
            .check_and_admit(now, 1);

        assert_eq!(state.window_count(), 2);
        assert_eq!(state.window(DEFAULT_ENDPOINT, RatePolicy::default(), now).count(), 2);
    }

    #[test]
    fn deferral_expires() {
        let now = Instant::now();
        let mut state = CallState::new("bridge");
        state.defer_until(now + Duration::from_secs(2));

        assert!(state.pending_deferral(now).is_some());
        assert!(state.pending_deferral(now + Duration::from_secs(3)).is_none());

        state.clear_deferral();
        assert!(state.pending_deferral(now).is_none());
    }

    #[test]
    fn outcome_tracking() {
        let mut state = CallState::new("bridge");
        state.record_error("HTTP 500".into());
        assert!(!state.succeeded());
        assert_eq!(state.last_error(), Some("HTTP 500"));

        state.record_success(Body::Empty);
        assert!(state.succeeded());
        assert!(matches!(state.last_body(), Some(Body::Empty)));
    }
}
