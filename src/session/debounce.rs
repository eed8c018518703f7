//! Edit debouncing: collapse keystroke bursts into one compile trigger.
//!
//! Pure timing, no business logic: the debouncer holds the latest pending
//! source and reports readiness once a quiet period has elapsed with no
//! further edits. The last edit's content wins. Explicit submit/share
//! actions never pass through here.

use std::time::Duration;

use tokio::time::Instant;

/// Default quiet period between a keystroke and the compile it triggers
pub const DEFAULT_QUIET_MS: u64 = 200;

pub struct Debouncer {
    quiet: Duration,
    pending: Option<String>,
    last_edit: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            last_edit: None,
        }
    }

    /// Record an edit. Supersedes any pending content and restarts the
    /// quiet-period timer.
    pub fn record(&mut self, source: String) {
        self.pending = Some(source);
        self.last_edit = Some(Instant::now());
    }

    pub fn is_ready(&self) -> bool {
        match (&self.pending, self.last_edit) {
            (Some(_), Some(last_edit)) => last_edit.elapsed() >= self.quiet,
            _ => false,
        }
    }

    /// Take the pending source if the quiet period has elapsed.
    pub fn take_if_ready(&mut self) -> Option<String> {
        if !self.is_ready() {
            return None;
        }
        self.last_edit = None;
        self.pending.take()
    }

    /// Precise sleep duration until the next possible fire time.
    pub fn sleep_duration(&self) -> Duration {
        let Some(last_edit) = self.last_edit else {
            // Nothing pending: park until an event arrives
            return Duration::from_secs(86400);
        };
        self.quiet
            .saturating_sub(last_edit.elapsed())
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const QUIET: Duration = Duration::from_millis(DEFAULT_QUIET_MS);

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_edit() {
        let mut debouncer = Debouncer::new(QUIET);

        debouncer.record("a".to_string());
        advance(Duration::from_millis(50)).await;
        debouncer.record("ab".to_string());
        advance(Duration::from_millis(50)).await;
        debouncer.record("abc".to_string());

        // Still inside the quiet window of the last edit
        advance(Duration::from_millis(150)).await;
        assert!(debouncer.take_if_ready().is_none());

        advance(Duration::from_millis(60)).await;
        assert_eq!(debouncer.take_if_ready().as_deref(), Some("abc"));

        // One trigger for the whole burst
        assert!(debouncer.take_if_ready().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_edits_fire_independently() {
        let mut debouncer = Debouncer::new(QUIET);

        debouncer.record("first".to_string());
        advance(Duration::from_millis(250)).await;
        assert_eq!(debouncer.take_if_ready().as_deref(), Some("first"));

        debouncer.record("second".to_string());
        advance(Duration::from_millis(250)).await;
        assert_eq!(debouncer.take_if_ready().as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_after_fire_schedules_new_timer() {
        let mut debouncer = Debouncer::new(QUIET);

        debouncer.record("first".to_string());
        advance(QUIET).await;
        assert!(debouncer.take_if_ready().is_some());

        debouncer.record("second".to_string());
        assert!(!debouncer.is_ready());
        advance(QUIET).await;
        assert!(debouncer.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_duration_tracks_quiet_window() {
        let mut debouncer = Debouncer::new(QUIET);
        assert_eq!(debouncer.sleep_duration(), Duration::from_secs(86400));

        debouncer.record("x".to_string());
        advance(Duration::from_millis(150)).await;
        let remaining = debouncer.sleep_duration();
        assert!(remaining <= Duration::from_millis(50));
        assert!(remaining >= Duration::from_millis(1));
    }
}
