/// The three knobs a Committer exposes, all unbounded/disabled by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitConfig {
    /// Overall per-call deadline. `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Cap on parked threads in the WaitLock. `None` is uncapped.
    pub max_hold_threads: Option<u64>,
    /// Enables adaptive load shedding in the WaitLock. `None` disables it
    /// (reject_rate stays 0).
    pub propose_wait_threshold_ms: Option<u64>,
}
