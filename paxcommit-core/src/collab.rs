// Contracts for the Committer's external collaborators. Each trait models
// a peer module this crate doesn't implement: the Paxos I/O loop, the
// state-machine registry, the single-slot commit rendezvous, and
// telemetry. The Committer only ever holds these behind Arc<dyn ...>.

use crate::result::TryCommitResult;

/// The state-machine identifier plus an opaque per-call cookie handed back
/// to the state machine on apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmCtx {
    pub sm_id: u32,
    pub cookie: u64,
}

/// Packs a state-machine identifier into the value prefix before Paxos
/// ever sees it. The wire framing is this trait's business, not the
/// Committer's.
pub trait StateMachineRegistry: Send + Sync {
    fn pack_value(&self, value: Vec<u8>, sm_id: u32) -> Vec<u8>;
}

/// The single-threaded event loop that runs proposer logic. The Committer
/// never runs inside it; it only notifies.
pub trait IoLoop: Send + Sync {
    /// Non-blocking, idempotent. The loop may coalesce notifications, so
    /// callers must not assume one notify() corresponds to one wakeup.
    fn notify(&self);
}

/// A single-slot rendezvous between a caller thread and the I/O loop for
/// one commit attempt.
pub trait CommitContext: Send + Sync {
    /// Store into the single slot. Must be called with the WaitLock held.
    /// Implementations must discard any result still latched from an
    /// abandoned prior attempt before accepting this one — publish always
    /// starts a fresh rendezvous, so a caller that gave up never has its
    /// slot confused with a later caller's.
    fn publish(&self, packed_value: Vec<u8>, sm_ctx: Option<SmCtx>, timeout_ms: Option<u64>);

    /// Block until the I/O loop reports a terminal outcome for the most
    /// recent publish.
    fn await_result(&self) -> TryCommitResult;
}

/// Counters for the commit path. All methods are best-effort no-ops by
/// default: a missing or partial telemetry sink must never change
/// Committer behavior.
pub trait Telemetry: Send + Sync {
    fn submitted(&self) {}
    fn commit_ok(&self, _latency_ms: u64) {}
    fn commit_fail(&self) {}
    fn conflict(&self) {}
    fn lock_timeout(&self) {}
    fn lock_reject(&self) {}
    fn lock_ok(&self, _wait_ms: u64) {}
}

/// A `Telemetry` sink that records nothing.
pub struct NoopTelemetry;
impl Telemetry for NoopTelemetry {}
