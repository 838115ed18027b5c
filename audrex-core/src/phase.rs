/// Lifecycle of a single trial. Transitions only move forward.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum TrialPhase {
    #[default]
    Initializing,
    Running,
    Finalizing,
    Done,
}

impl TrialPhase {
    /// Only a running trial reacts to responses, completion or timeouts.
    pub fn allows_input(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}
