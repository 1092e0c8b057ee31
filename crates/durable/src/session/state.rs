//! Session lifecycle states

use serde::{Deserialize, Serialize};

/// Session lifecycle state
///
/// ```text
/// Created ──► Bound ──► Active ◄──► Idle ──► Completed
///               │         │                     ▲
///               │         └──► Failed           │
///               └──────────────┴────────────────┘ (empty chain)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Allocated, no worker accepted yet
    Created,
    /// A worker accepted the binding
    Bound,
    /// An activity is executing on the bound worker
    Active,
    /// Between activities
    Idle,
    /// Binding released
    Completed,
    /// Worker lost or deadline passed; only a recreate can continue the chain
    Failed,
}

impl SessionState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if a transition to `next` is legal
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Bound)
                | (Bound, Active)
                | (Bound, Completed)
                | (Bound, Failed)
                | (Active, Idle)
                | (Active, Failed)
                | (Idle, Active)
                | (Idle, Completed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Bound => "bound",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SessionState::*;
        let path = [Created, Bound, Active, Idle, Active, Idle, Completed];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_failed_reachable_from_bound_and_active_only() {
        use SessionState::*;
        assert!(Bound.can_transition_to(Failed));
        assert!(Active.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Created.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        use SessionState::*;
        for next in [Created, Bound, Active, Idle, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Idle.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::Idle).unwrap();
        assert_eq!(json, "\"idle\"");
    }
}
