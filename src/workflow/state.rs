/// Lifecycle of one document's revision workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    BranchResolving,
    /// A pull request already exists for the revision. Terminal.
    AlreadyDone,
    /// The document has no units. Terminal.
    NothingToCorrect,
    BranchReady,
    /// Running the oracle for unit `i` (visitation order).
    ProcessingUnit(usize),
    /// Writing, checkpointing, committing and pushing unit `i`.
    Committing(usize),
    /// Cancellation was requested between units. Terminal for this run.
    Interrupted,
    Finalizing,
    PullRequestOpen,
    /// Checkpoint removed, back on the base line. Terminal.
    Cleaned,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::AlreadyDone
                | WorkflowState::NothingToCorrect
                | WorkflowState::Interrupted
                | WorkflowState::Cleaned
        )
    }

    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (Idle, BranchResolving) => true,
            (BranchResolving, AlreadyDone | NothingToCorrect | BranchReady) => true,
            (BranchReady, ProcessingUnit(_) | Finalizing | Interrupted) => true,
            (ProcessingUnit(i), Committing(j)) => i == j,
            (Committing(i), ProcessingUnit(j)) => j == i + 1,
            (Committing(_), Finalizing | Interrupted) => true,
            (Finalizing, PullRequestOpen) => true,
            (PullRequestOpen, Cleaned) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::BranchResolving => write!(f, "branch-resolving"),
            WorkflowState::AlreadyDone => write!(f, "already-done"),
            WorkflowState::NothingToCorrect => write!(f, "nothing-to-correct"),
            WorkflowState::BranchReady => write!(f, "branch-ready"),
            WorkflowState::ProcessingUnit(i) => write!(f, "processing-unit-{}", i),
            WorkflowState::Committing(i) => write!(f, "committing-{}", i),
            WorkflowState::Interrupted => write!(f, "interrupted"),
            WorkflowState::Finalizing => write!(f, "finalizing"),
            WorkflowState::PullRequestOpen => write!(f, "pull-request-open"),
            WorkflowState::Cleaned => write!(f, "cleaned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorkflowState::*;
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Idle,
            BranchResolving,
            BranchReady,
            ProcessingUnit(0),
            Committing(0),
            ProcessingUnit(1),
            Committing(1),
            Finalizing,
            PullRequestOpen,
            Cleaned,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_resume_starts_mid_document() {
        assert!(BranchReady.can_transition_to(ProcessingUnit(4)));
        assert!(BranchReady.can_transition_to(Finalizing));
    }

    #[test]
    fn test_units_are_visited_in_order() {
        assert!(!Committing(1).can_transition_to(ProcessingUnit(3)));
        assert!(!Committing(1).can_transition_to(ProcessingUnit(1)));
        assert!(!ProcessingUnit(2).can_transition_to(Committing(3)));
        assert!(!ProcessingUnit(2).can_transition_to(Finalizing));
    }

    #[test]
    fn test_terminal_states() {
        for state in [AlreadyDone, NothingToCorrect, Interrupted, Cleaned] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(BranchResolving));
        }
        assert!(!Finalizing.is_terminal());
        assert!(!PullRequestOpen.can_transition_to(Finalizing));
    }
}
