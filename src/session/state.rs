//! Session state and the reconciler that owns it.
//!
//! The reconciler is the only writer of [`SessionState`] and is driven to
//! completion for one event before the next (the controller is a single
//! task), so transitions never interleave.
//!
//! Staleness rules:
//! - a new request clears the alert and marker before any response lands,
//!   so a superseded error can never flash over fresh input
//! - responses that carry a sequence number older than the latest issued
//!   request are discarded outright

use crate::compile::RequestKind;
use crate::error::{CompileError, Location};

/// What the playground surface renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Compiled output
    pub output: String,
    /// Latest compile failure, if any
    pub alert: Option<CompileError>,
    /// Marker position in the most recently submitted source
    pub location: Option<Location>,
    /// Execution results for the current session
    pub side_data: String,
    /// Shareable link for the last persisted snapshot
    pub share_link: String,
}

pub struct Reconciler {
    state: SessionState,
    /// Highest sequence number handed out; sequenced responses older than
    /// this are dropped instead of applied
    latest_seq: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: SessionState::default(),
            latest_seq: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Start request `seq`. The alert and marker reset unconditionally;
    /// side data and the share link reset only for edit-driven requests -
    /// submit/share must not disturb unrelated fields.
    pub fn begin_request(&mut self, seq: u64, kind: RequestKind) {
        self.latest_seq = self.latest_seq.max(seq);
        self.state.alert = None;
        self.state.location = None;
        if kind == RequestKind::Edit {
            self.state.side_data.clear();
            self.state.share_link.clear();
        }
    }

    fn is_stale(&self, seq: Option<u64>) -> bool {
        matches!(seq, Some(seq) if seq < self.latest_seq)
    }

    /// Apply compiled output. Does not clear any other field.
    pub fn apply_output(&mut self, seq: Option<u64>, sql: String) -> bool {
        if self.is_stale(seq) {
            return false;
        }
        self.state.output = sql;
        true
    }

    /// Apply a compile failure: the alert is replaced and the marker follows
    /// the error's location - absent location, absent marker.
    pub fn apply_error(&mut self, seq: Option<u64>, error: CompileError) -> bool {
        if self.is_stale(seq) {
            return false;
        }
        self.state.location = error.location;
        self.state.alert = Some(error);
        true
    }

    pub fn apply_side_data(&mut self, data: String) {
        self.state.side_data = data;
    }

    pub fn apply_share_link(&mut self, link: String) {
        self.state.share_link = link;
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Reconciler {
        let mut reconciler = Reconciler::new();
        reconciler.apply_output(None, "SELECT 1".to_string());
        reconciler.apply_error(
            None,
            CompileError::message("old error").with_location(Location::new(1, 1)),
        );
        reconciler.apply_side_data("rows".to_string());
        reconciler.apply_share_link("https://play/?share=old".to_string());
        reconciler
    }

    #[test]
    fn test_clear_before_apply_on_edit() {
        let mut reconciler = populated();
        reconciler.begin_request(1, RequestKind::Edit);

        let state = reconciler.state();
        assert_eq!(state.alert, None);
        assert_eq!(state.location, None);
        assert_eq!(state.side_data, "");
        assert_eq!(state.share_link, "");
        // The last output stays up until a response replaces it
        assert_eq!(state.output, "SELECT 1");
    }

    #[test]
    fn test_submit_keeps_unrelated_fields() {
        let mut reconciler = populated();
        reconciler.begin_request(1, RequestKind::Submit);

        let state = reconciler.state();
        assert_eq!(state.alert, None);
        assert_eq!(state.location, None);
        assert_eq!(state.side_data, "rows");
        assert_eq!(state.share_link, "https://play/?share=old");
    }

    #[test]
    fn test_share_keeps_unrelated_fields() {
        let mut reconciler = populated();
        reconciler.begin_request(1, RequestKind::Share);
        assert_eq!(reconciler.state().side_data, "rows");
        assert_eq!(reconciler.state().alert, None);
    }

    #[test]
    fn test_error_with_location_sets_marker() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_error(
            None,
            CompileError::message("syntax error").with_location(Location::new(2, 5)),
        );
        assert_eq!(
            reconciler.state().alert.as_ref().unwrap().message,
            "syntax error"
        );
        assert_eq!(reconciler.state().location, Some(Location::new(2, 5)));
    }

    #[test]
    fn test_error_without_location_clears_marker() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_error(
            None,
            CompileError::message("first").with_location(Location::new(2, 5)),
        );
        reconciler.apply_error(None, CompileError::message("second"));
        assert_eq!(reconciler.state().location, None);
        assert_eq!(reconciler.state().alert.as_ref().unwrap().message, "second");
    }

    #[test]
    fn test_stale_sequenced_responses_are_discarded() {
        let mut reconciler = Reconciler::new();
        reconciler.begin_request(1, RequestKind::Edit);
        reconciler.begin_request(2, RequestKind::Edit);

        // A slow response to request 1 arrives after request 2 was issued
        assert!(!reconciler.apply_output(Some(1), "stale".to_string()));
        assert_eq!(reconciler.state().output, "");
        assert!(!reconciler.apply_error(Some(1), CompileError::message("stale")));
        assert_eq!(reconciler.state().alert, None);

        assert!(reconciler.apply_output(Some(2), "fresh".to_string()));
        assert_eq!(reconciler.state().output, "fresh");
    }

    #[test]
    fn test_unsequenced_responses_apply_last_write_wins() {
        let mut reconciler = Reconciler::new();
        reconciler.begin_request(5, RequestKind::Edit);
        // Remote responses carry no sequence and always land
        assert!(reconciler.apply_output(None, "from remote".to_string()));
        assert_eq!(reconciler.state().output, "from remote");
    }

    #[test]
    fn test_apply_output_does_not_clear_others() {
        let mut reconciler = populated();
        reconciler.apply_output(None, "SELECT 2".to_string());
        assert_eq!(reconciler.state().side_data, "rows");
        assert!(reconciler.state().alert.is_some());
    }
}
