//! Acquisition session state machine
//!
//! IDLE → INITIALIZING → LOGGEDIN → ACQUIRING ⇄ ROTATING → COMPLETED | ABORTED
//!
//! The session object is owned by the controller; everyone else reads it
//! through [`AcquisitionSession::snapshot`].

use crate::error::{AcqError, AcqResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Acquisition workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AcquisitionState {
    /// Created, not yet started
    Idle,
    /// Creating the automation surface
    Initializing,
    /// Authentication handshake succeeded
    LoggedIn,
    /// Main loop: fetch, intake, label, persist
    Acquiring,
    /// Switching the active location
    Rotating,
    /// Target reached or locations exhausted
    Completed,
    /// Fatal error or cancellation
    Aborted,
}

impl AcquisitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "IDLE",
            AcquisitionState::Initializing => "INITIALIZING",
            AcquisitionState::LoggedIn => "LOGGEDIN",
            AcquisitionState::Acquiring => "ACQUIRING",
            AcquisitionState::Rotating => "ROTATING",
            AcquisitionState::Completed => "COMPLETED",
            AcquisitionState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AcquisitionState::Completed | AcquisitionState::Aborted)
    }

    /// Edges of the state graph; terminal states have none
    pub fn can_transition_to(&self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, LoggedIn)
                | (Initializing, Aborted)
                | (LoggedIn, Acquiring)
                | (LoggedIn, Aborted)
                | (Acquiring, Rotating)
                | (Acquiring, Completed)
                | (Acquiring, Aborted)
                | (Rotating, Acquiring)
                | (Rotating, Aborted)
        )
    }
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: AcquisitionState,
    pub new_state: AcquisitionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Error accumulated during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub error_type: String,
    pub message: String,
    pub location: Option<String>,
    pub item_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Per-location counters as reported in status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub location: String,
    pub accepted: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Acquisition session (in-memory state of one run)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSession {
    pub session_id: Uuid,
    pub state: AcquisitionState,
    pub target_count: usize,
    pub locations: Vec<String>,
    pub current_location: Option<String>,
    pub accepted: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Set when the run ended because no location could supply more items
    pub exhausted: bool,
    pub unique_fingerprints: usize,
    pub location_stats: Vec<LocationSummary>,
    pub errors: Vec<SessionError>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Read-only view of a session for status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: AcquisitionState,
    /// True until the session reaches a terminal state
    pub active: bool,
    pub accepted_count: usize,
    pub skipped_count: usize,
    pub errored_count: usize,
    pub target_count: usize,
    pub current_location: Option<String>,
    pub exhausted: bool,
    pub unique_fingerprints: usize,
    pub location_stats: Vec<LocationSummary>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub errors: Vec<SessionError>,
}

impl AcquisitionSession {
    pub fn new(target_count: usize, locations: Vec<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: AcquisitionState::Idle,
            target_count,
            locations,
            current_location: None,
            accepted: 0,
            skipped: 0,
            errored: 0,
            exhausted: false,
            unique_fingerprints: 0,
            location_stats: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    ///
    /// Moves outside the state graph are refused and leave the session untouched.
    pub fn transition_to(&mut self, new_state: AcquisitionState) -> AcqResult<StateTransition> {
        if !self.state.can_transition_to(new_state) {
            return Err(AcqError::IllegalTransition {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Ok(transition)
    }

    pub fn add_error(
        &mut self,
        error_type: &str,
        message: impl Into<String>,
        location: Option<&str>,
        item_id: Option<&str>,
    ) {
        self.errors.push(SessionError {
            error_type: error_type.to_string(),
            message: message.into(),
            location: location.map(str::to_string),
            item_id: item_id.map(str::to_string),
            occurred_at: Utc::now(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn duration_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            state: self.state,
            active: !self.is_terminal(),
            accepted_count: self.accepted,
            skipped_count: self.skipped,
            errored_count: self.errored,
            target_count: self.target_count,
            current_location: self.current_location.clone(),
            exhausted: self.exhausted,
            unique_fingerprints: self.unique_fingerprints,
            location_stats: self.location_stats.clone(),
            start_time: self.started_at,
            end_time: self.ended_at,
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = AcquisitionSession::new(3, vec!["Paris".into()]);
        assert_eq!(session.state, AcquisitionState::Idle);

        let t = session.transition_to(AcquisitionState::Initializing).unwrap();
        assert_eq!(t.old_state, AcquisitionState::Idle);
        assert!(session.ended_at.is_none());

        session.transition_to(AcquisitionState::Aborted).unwrap();
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_snapshot_keeps_counts_and_errors_after_abort() {
        let mut session = AcquisitionSession::new(3, vec!["Paris".into()]);
        session.accepted = 2;
        session.add_error("AuthError", "denied", Some("Paris"), None);
        session.transition_to(AcquisitionState::Initializing).unwrap();
        session.transition_to(AcquisitionState::Aborted).unwrap();

        let snapshot = session.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.accepted_count, 2);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].location.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let json = serde_json::to_string(&AcquisitionState::LoggedIn).unwrap();
        assert_eq!(json, "\"LOGGEDIN\"");
        assert_eq!(AcquisitionState::LoggedIn.to_string(), "LOGGEDIN");
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut session = AcquisitionSession::new(1, vec!["Paris".into()]);
        for state in [
            AcquisitionState::Initializing,
            AcquisitionState::LoggedIn,
            AcquisitionState::Acquiring,
            AcquisitionState::Completed,
        ] {
            session.transition_to(state).unwrap();
        }
        let ended_at = session.ended_at;

        let err = session.transition_to(AcquisitionState::Acquiring).unwrap_err();
        assert!(matches!(
            err,
            AcqError::IllegalTransition {
                from: AcquisitionState::Completed,
                to: AcquisitionState::Acquiring
            }
        ));
        assert_eq!(session.state, AcquisitionState::Completed);
        assert_eq!(session.ended_at, ended_at);
        assert!(session.transition_to(AcquisitionState::Aborted).is_err());
    }

    #[test]
    fn test_completion_only_from_acquiring() {
        use AcquisitionState::*;
        for from in [Idle, Initializing, LoggedIn, Rotating, Aborted] {
            assert!(!from.can_transition_to(Completed), "{} -> COMPLETED", from);
        }
        assert!(Acquiring.can_transition_to(Completed));
        assert!(Rotating.can_transition_to(Acquiring));
        assert!(!Idle.can_transition_to(Acquiring));
    }
}
