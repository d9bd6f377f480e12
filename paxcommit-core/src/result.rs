// The closed outcome taxonomy a commit attempt can resolve to. OK carries
// the assigned Paxos instance id; every other variant is a terminal,
// non-panicking outcome the caller decides how to react to.

/// Reserved state-machine id for the built-in master-lease state machine
/// (phxpaxos's MASTER_V_SMID). Commits tagged with this id never retry on
/// conflict: master elections must not thrash.
pub const MASTER_STATE_MACHINE_ID: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryCommitResult {
    /// Paxos chose the value; the instance id is valid.
    Ok(u64),
    /// A different value was chosen for the target instance.
    Conflict,
    /// The configured deadline elapsed, either in the WaitLock or in the
    /// Paxos round itself.
    Timeout,
    /// Admission was denied by the WaitLock's cap or adaptive shedder.
    TooManyThreadsWaiting,
    /// The I/O loop reported a code this crate doesn't otherwise model;
    /// propagated unchanged rather than swallowed.
    Internal(String),
}

impl TryCommitResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, TryCommitResult::Conflict)
    }
}

/// Whether a conflict on this attempt should be retried: true for any
/// non-master state machine, never for the master-lease one — master
/// elections must not thrash on a retry loop.
pub fn conflict_is_retryable(sm_id: Option<u32>) -> bool {
    sm_id != Some(MASTER_STATE_MACHINE_ID)
}
