//! Task lifecycle constants and state machine.
//!
//! The conditional UPDATE statements in the store enforce these rules in
//! SQL; this module is the single written-down form, used by the audit
//! layer and by tests.

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority value for urgent tasks. Dequeued before all others.
pub const PRIORITY_URGENT: i64 = 10;

/// Priority value for normal tasks. Default.
pub const PRIORITY_NORMAL: i64 = 0;

/// Priority value for bulk backfill tasks. Dequeued last.
pub const PRIORITY_BACKGROUND: i64 = -10;

/// Default retry budget for a new task.
pub const DEFAULT_MAX_RETRIES: i64 = 3;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const CANCELLED: &str = "cancelled";

    /// Returns the set of valid target statuses reachable from `from`.
    ///
    /// Terminal statuses return an empty slice: no further transitions.
    /// `processing -> pending` is the retry/stale-reset edge.
    pub fn valid_transitions(from: &str) -> &'static [&'static str] {
        match from {
            PENDING => &[PROCESSING, CANCELLED],
            PROCESSING => &[COMPLETED, FAILED, CANCELLED, PENDING],
            COMPLETED | FAILED | CANCELLED => &[],
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: &str, to: &str) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Whether a status admits no further transitions.
    pub fn is_terminal(status: &str) -> bool {
        matches!(status, COMPLETED | FAILED | CANCELLED)
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_processing() {
        assert!(can_transition(PENDING, PROCESSING));
    }

    #[test]
    fn pending_to_cancelled() {
        assert!(can_transition(PENDING, CANCELLED));
    }

    #[test]
    fn processing_to_completed() {
        assert!(can_transition(PROCESSING, COMPLETED));
    }

    #[test]
    fn processing_to_failed() {
        assert!(can_transition(PROCESSING, FAILED));
    }

    #[test]
    fn processing_to_cancelled() {
        assert!(can_transition(PROCESSING, CANCELLED));
    }

    #[test]
    fn processing_back_to_pending_on_retry() {
        assert!(can_transition(PROCESSING, PENDING));
    }

    // -----------------------------------------------------------------------
    // Terminal states have no outgoing transitions
    // -----------------------------------------------------------------------

    #[test]
    fn completed_has_no_transitions() {
        assert!(valid_transitions(COMPLETED).is_empty());
    }

    #[test]
    fn failed_has_no_transitions() {
        assert!(valid_transitions(FAILED).is_empty());
    }

    #[test]
    fn cancelled_has_no_transitions() {
        assert!(valid_transitions(CANCELLED).is_empty());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_completed_invalid() {
        assert!(!can_transition(PENDING, COMPLETED));
    }

    #[test]
    fn completed_to_pending_invalid() {
        assert!(!can_transition(COMPLETED, PENDING));
    }

    #[test]
    fn cancelled_to_processing_invalid() {
        assert!(!can_transition(CANCELLED, PROCESSING));
    }

    #[test]
    fn unknown_status_has_no_transitions() {
        assert!(valid_transitions("paused").is_empty());
    }

    // -----------------------------------------------------------------------
    // Terminality
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal(COMPLETED));
        assert!(is_terminal(FAILED));
        assert!(is_terminal(CANCELLED));
        assert!(!is_terminal(PENDING));
        assert!(!is_terminal(PROCESSING));
    }
}
