use derive_more::derive::Display;

/// The coarse job state classes the queue aggregation counts.
///
/// Slurm reports many more states (`COMPLETING`, `CONFIGURING`, `PREEMPTED`, …). Everything that is
/// not one of the three interesting ones ends up in [`StateClass::Other`] and is not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StateClass {
    #[display("pending")]
    Pending,
    #[display("running")]
    Running,
    #[display("suspended")]
    Suspended,
    #[display("other")]
    Other,
}

impl StateClass {
    /// Classify a state token by prefix, ignoring case.
    pub fn classify(state: &str) -> Self {
        let state = state.to_lowercase();
        if state.starts_with("pending") {
            StateClass::Pending
        } else if state.starts_with("running") {
            StateClass::Running
        } else if state.starts_with("suspended") {
            StateClass::Suspended
        } else {
            StateClass::Other
        }
    }
}
