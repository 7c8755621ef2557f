//! Workflow states.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    CollectingInputs,
    Discovering,
    Compiling,
    AwaitingConfirmation,
    Provisioning,
    Assembling,
    Done,
    Aborted,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::CollectingInputs => "collecting_inputs",
            WorkflowState::Discovering => "discovering",
            WorkflowState::Compiling => "compiling",
            WorkflowState::AwaitingConfirmation => "awaiting_confirmation",
            WorkflowState::Provisioning => "provisioning",
            WorkflowState::Assembling => "assembling",
            WorkflowState::Done => "done",
            WorkflowState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Aborted)
    }

    /// Operator cancellation is honored only before provisioning starts.
    pub fn accepts_cancellation(&self) -> bool {
        matches!(
            self,
            WorkflowState::CollectingInputs
                | WorkflowState::Discovering
                | WorkflowState::Compiling
                | WorkflowState::AwaitingConfirmation
        )
    }

    /// Whether `next` is a legal successor.
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        if next == Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (CollectingInputs, Discovering)
                | (Discovering, Compiling)
                | (Compiling, AwaitingConfirmation)
                | (AwaitingConfirmation, Compiling)
                | (AwaitingConfirmation, Provisioning)
                | (AwaitingConfirmation, Assembling)
                | (Provisioning, Assembling)
                | (Assembling, Done)
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use WorkflowState::*;
        assert!(CollectingInputs.can_transition_to(Discovering));
        assert!(AwaitingConfirmation.can_transition_to(Compiling));
        assert!(Provisioning.can_transition_to(Assembling));
        assert!(Provisioning.can_transition_to(Aborted));
        assert!(!Compiling.can_transition_to(Provisioning));
        assert!(!Done.can_transition_to(Aborted));
        assert!(!Provisioning.accepts_cancellation());
    }
}
