// ============================================================================
// Migration Run State Machine
// ============================================================================
//
//   Start ──inspect──> AlreadyPresent                      (terminal)
//     │
//     └──inspect──> Absent ──migrate──> Applied ──verify──> Verified (terminal)
//
// Any edge may instead lead to Failed(step), which is terminal.
//
// ============================================================================

use std::fmt;

use serde::Serialize;

use super::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum RunState {
    Start,
    AlreadyPresent,
    Absent,
    Applied,
    Verified,
    Failed(Step),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::AlreadyPresent | RunState::Verified | RunState::Failed(_)
        )
    }

    pub fn can_advance_to(&self, next: RunState) -> bool {
        match (self, next) {
            (state, RunState::Failed(_)) => !state.is_terminal(),
            (RunState::Start, RunState::AlreadyPresent | RunState::Absent) => true,
            (RunState::Absent, RunState::Applied) => true,
            (RunState::Applied, RunState::Verified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Start => write!(f, "START"),
            RunState::AlreadyPresent => write!(f, "ALREADY_PRESENT"),
            RunState::Absent => write!(f, "ABSENT"),
            RunState::Applied => write!(f, "APPLIED"),
            RunState::Verified => write!(f, "VERIFIED"),
            RunState::Failed(step) => write!(f, "FAILED({})", step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(RunState::Start.can_advance_to(RunState::Absent));
        assert!(RunState::Absent.can_advance_to(RunState::Applied));
        assert!(RunState::Applied.can_advance_to(RunState::Verified));
        assert!(RunState::Verified.is_terminal());
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        assert!(!RunState::AlreadyPresent.can_advance_to(RunState::Applied));
        assert!(!RunState::Verified.can_advance_to(RunState::Failed(Step::Verify)));
        assert!(!RunState::Failed(Step::Commit).can_advance_to(RunState::Applied));
        assert!(!RunState::Start.can_advance_to(RunState::Applied));
    }

    #[test]
    fn test_any_open_state_can_fail() {
        for state in [RunState::Start, RunState::Absent, RunState::Applied] {
            assert!(state.can_advance_to(RunState::Failed(Step::Commit)));
        }
        assert_eq!(RunState::Failed(Step::Normalize).to_string(), "FAILED(normalize)");
    }
}
