//! Finite state machine for one release on one host

use serde::{Deserialize, Serialize};

use crate::errors::CapstanError;

/// Release state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    /// Nothing created yet
    Pending,

    /// Release directory copied and revision recorded
    Staged,

    /// Shared directories and files linked into the release
    SharedLinked,

    /// `current` points at the release (terminal success)
    Activated,

    /// A step failed
    Failed,

    /// The release directory of a failed attempt was removed
    RolledBack,
}

impl ReleaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseState::Activated | ReleaseState::Failed | ReleaseState::RolledBack
        )
    }
}

/// Release event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseEvent {
    Stage,
    LinkShared,
    Activate,
    /// A step failed with the given message
    Fail(String),
    RollBack,
}

/// Release FSM
#[derive(Debug, Clone)]
pub struct ReleaseFsm {
    state: ReleaseState,
    error: Option<String>,
}

impl ReleaseFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: ReleaseState::Pending,
            error: None,
        }
    }

    pub fn state(&self) -> ReleaseState {
        self.state
    }

    /// Message of the failure that moved the release to `Failed`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReleaseEvent) -> Result<(), CapstanError> {
        let new_state = match (&self.state, &event) {
            (ReleaseState::Pending, ReleaseEvent::Stage) => ReleaseState::Staged,
            (ReleaseState::Staged, ReleaseEvent::LinkShared) => ReleaseState::SharedLinked,
            (ReleaseState::SharedLinked, ReleaseEvent::Activate) => ReleaseState::Activated,

            // Once `current` moved the release is live and can no longer fail.
            (
                ReleaseState::Pending | ReleaseState::Staged | ReleaseState::SharedLinked,
                ReleaseEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                ReleaseState::Failed
            }

            (ReleaseState::Failed, ReleaseEvent::RollBack) => ReleaseState::RolledBack,

            (state, event) => {
                return Err(CapstanError::StateError(format!(
                    "Invalid transition: {:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ReleaseFsm {
    fn default() -> Self {
        Self::new()
    }
}
