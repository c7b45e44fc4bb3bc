//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use smashguard_core::types::InputMode;

/// `Stopped -> Starting(mode) -> Active(mode) -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Stopped,
    Starting(InputMode),
    Active(InputMode),
    Stopping,
}

impl SessionState {
    /// Engine initialisation or acquisition is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Starting(_))
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, SessionState::Stopping)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Mode of the session being started or running.
    pub fn current_mode(&self) -> Option<InputMode> {
        match self {
            SessionState::Starting(mode) | SessionState::Active(mode) => Some(*mode),
            SessionState::Stopped | SessionState::Stopping => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => f.write_str("stopped"),
            SessionState::Starting(mode) => write!(f, "starting({mode})"),
            SessionState::Active(mode) => write!(f, "active({mode})"),
            SessionState::Stopping => f.write_str("stopping"),
        }
    }
}
