// The commit coordinator: packages a caller's value with a state-machine
// identifier, hands it to the CommitContext, signals the IoLoop, waits for
// a result, and applies the bounded retry policy.
// Grounded on phxpaxos's src/algorithm/committer.cpp NewValueGetIDNoRetry /
// NewValueGetID, rewritten around Rust traits instead of raw pointers to
// the collaborating objects — the collaborators are owned via Arc<dyn ...>
// handles rather than cross-referencing raw pointers, so there's no cycle
// to break on teardown.

use std::sync::{Arc, Mutex};

use paxcommit_base::steady_ms;
use paxcommit_sync::{AcquireOutcome, WaitLock};

use crate::collab::{CommitContext, IoLoop, SmCtx, StateMachineRegistry, Telemetry};
use crate::config::CommitConfig;
use crate::result::{conflict_is_retryable, TryCommitResult};

/// Emit the "wait threads / avg wait / reject rate" status line at most
/// once per this many milliseconds.
const STATUS_LOG_INTERVAL_MS: u64 = 1_000;

/// Below this remaining budget a commit can't realistically finish a
/// consensus round, so it's aborted before publish rather than attempted.
const MIN_VIABLE_LEFT_MS: u64 = 200;

/// Maximum attempts per submit, regardless of outcome.
const MAX_ATTEMPTS: u32 = 3;

pub struct Committer {
    wait_lock: WaitLock,
    commit_ctx: Arc<dyn CommitContext>,
    io_loop: Arc<dyn IoLoop>,
    sm_registry: Arc<dyn StateMachineRegistry>,
    telemetry: Arc<dyn Telemetry>,
    timeout_ms: Mutex<Option<u64>>,
    last_status_log_time: Mutex<u64>,
}

impl Committer {
    pub fn new(
        commit_ctx: Arc<dyn CommitContext>,
        io_loop: Arc<dyn IoLoop>,
        sm_registry: Arc<dyn StateMachineRegistry>,
        telemetry: Arc<dyn Telemetry>,
        config: CommitConfig,
    ) -> Self {
        let wait_lock = WaitLock::new();
        wait_lock.set_max_waiting(config.max_hold_threads);
        wait_lock.set_wait_threshold(config.propose_wait_threshold_ms);

        Committer {
            wait_lock,
            commit_ctx,
            io_loop,
            sm_registry,
            telemetry,
            timeout_ms: Mutex::new(config.timeout_ms),
            last_status_log_time: Mutex::new(steady_ms()),
        }
    }

    pub fn set_timeout(&self, timeout_ms: Option<u64>) {
        *self.timeout_ms.lock().expect("timeout_ms poisoned") = timeout_ms;
    }

    pub fn set_max_hold_threads(&self, n: Option<u64>) {
        self.wait_lock.set_max_waiting(n);
    }

    pub fn set_propose_wait_threshold(&self, ms: Option<u64>) {
        self.wait_lock.set_wait_threshold(ms);
    }

    /// Fire-and-track: returns the assigned instance id on success,
    /// discarding the per-call state-machine cookie.
    pub fn submit(&self, value: Vec<u8>) -> Result<u64, TryCommitResult> {
        match self.submit_with_id(value) {
            (Some(id), TryCommitResult::Ok(_)) => Ok(id),
            (_, result) => Err(result),
        }
    }

    pub fn submit_with_id(&self, value: Vec<u8>) -> (Option<u64>, TryCommitResult) {
        self.submit_with_ctx_opt(value, None)
    }

    pub fn submit_with_ctx(&self, value: Vec<u8>, sm_ctx: SmCtx) -> (Option<u64>, TryCommitResult) {
        self.submit_with_ctx_opt(value, Some(sm_ctx))
    }

    fn submit_with_ctx_opt(
        &self,
        value: Vec<u8>,
        sm_ctx: Option<SmCtx>,
    ) -> (Option<u64>, TryCommitResult) {
        self.telemetry.submitted();
        let start = steady_ms();
        let sm_id = sm_ctx.map(|c| c.sm_id);

        let mut id = None;
        let mut result = TryCommitResult::Internal("submit produced no attempts".to_string());

        for _attempt in 0..MAX_ATTEMPTS {
            let (attempt_id, attempt_result) = self.attempt_once(&value, sm_ctx);
            id = attempt_id;
            let is_conflict = attempt_result.is_conflict();
            result = attempt_result;

            if !is_conflict {
                break;
            }
            self.telemetry.conflict();
            if !conflict_is_retryable(sm_id) {
                break;
            }
        }

        match &result {
            TryCommitResult::Ok(_) => {
                self.telemetry.commit_ok(steady_ms().saturating_sub(start));
            }
            _ => self.telemetry.commit_fail(),
        }

        (id, result)
    }

    fn attempt_once(&self, value: &[u8], sm_ctx: Option<SmCtx>) -> (Option<u64>, TryCommitResult) {
        self.log_status_if_due();

        let configured_timeout = *self.timeout_ms.lock().expect("timeout_ms poisoned");

        let wait_ms = match self.wait_lock.acquire(configured_timeout) {
            AcquireOutcome::Admitted { wait_ms } => {
                self.telemetry.lock_ok(wait_ms);
                tracing::debug!(target: "paxcommit", wait_ms, "lock acquired");
                wait_ms
            }
            AcquireOutcome::Rejected => {
                self.telemetry.lock_reject();
                tracing::warn!(target: "paxcommit", "too many threads waiting, reject");
                return (None, TryCommitResult::TooManyThreadsWaiting);
            }
            AcquireOutcome::TimedOut { wait_ms } => {
                self.telemetry.lock_timeout();
                tracing::warn!(target: "paxcommit", wait_ms, "lock acquisition timed out");
                return (None, TryCommitResult::Timeout);
            }
        };

        let left_ms = match configured_timeout {
            None => None,
            Some(total) => {
                let left = total.saturating_sub(wait_ms);
                if left < MIN_VIABLE_LEFT_MS {
                    tracing::warn!(
                        target: "paxcommit",
                        wait_ms,
                        left,
                        "lock use time too long, no time left to run commit"
                    );
                    self.telemetry.lock_timeout();
                    self.wait_lock.release();
                    return (None, TryCommitResult::Timeout);
                }
                Some(left)
            }
        };

        let sm_id = sm_ctx.map(|c| c.sm_id).unwrap_or(0);
        let packed_value = self.sm_registry.pack_value(value.to_vec(), sm_id);

        self.commit_ctx.publish(packed_value, sm_ctx, left_ms);
        self.io_loop.notify();

        let result = self.commit_ctx.await_result();
        self.wait_lock.release();

        let id = match &result {
            TryCommitResult::Ok(id) => Some(*id),
            _ => None,
        };
        (id, result)
    }

    fn log_status_if_due(&self) {
        let now = steady_ms();
        let mut last = self
            .last_status_log_time
            .lock()
            .expect("last_status_log_time poisoned");
        if now <= *last || now - *last <= STATUS_LOG_INTERVAL_MS {
            return;
        }
        *last = now;
        drop(last);

        let stats = self.wait_lock.stats();
        tracing::info!(
            target: "paxcommit",
            waiting = stats.waiting,
            avg_wait_ms = stats.avg_ms,
            reject_rate = stats.reject_rate,
            "commit path status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::MASTER_STATE_MACHINE_ID;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Condvar;
    use test_log::test;

    /// A fake single-slot CommitContext + IoLoop that resolves whatever
    /// script of outcomes the test hands it, one per publish, so the
    /// Committer's retry logic can be exercised without a real Paxos node.
    struct ScriptedLoop {
        inner: Mutex<ScriptedLoopState>,
        cv: Condvar,
        next_id: AtomicU64,
    }

    struct ScriptedLoopState {
        script: VecDeque<TryCommitResult>,
        pending: bool,
        result: Option<TryCommitResult>,
    }

    impl ScriptedLoop {
        fn new(script: Vec<TryCommitResult>) -> Arc<Self> {
            Arc::new(ScriptedLoop {
                inner: Mutex::new(ScriptedLoopState {
                    script: script.into(),
                    pending: false,
                    result: None,
                }),
                cv: Condvar::new(),
                next_id: AtomicU64::new(7),
            })
        }
    }

    impl CommitContext for ScriptedLoop {
        fn publish(&self, _packed_value: Vec<u8>, _sm_ctx: Option<SmCtx>, _timeout_ms: Option<u64>) {
            let mut state = self.inner.lock().unwrap();
            state.result = None;
            state.pending = true;
        }

        fn await_result(&self) -> TryCommitResult {
            let mut state = self.inner.lock().unwrap();
            while state.result.is_none() {
                state = self.cv.wait(state).unwrap();
            }
            state.result.take().unwrap()
        }
    }

    impl IoLoop for ScriptedLoop {
        fn notify(&self) {
            let mut state = self.inner.lock().unwrap();
            if !state.pending {
                return;
            }
            state.pending = false;
            let next = state.script.pop_front().unwrap_or(TryCommitResult::Internal(
                "script exhausted".to_string(),
            ));
            state.result = Some(match next {
                TryCommitResult::Ok(_) => TryCommitResult::Ok(self.next_id.fetch_add(1, Ordering::SeqCst)),
                other => other,
            });
            self.cv.notify_all();
        }
    }

    struct IdentityRegistry;
    impl StateMachineRegistry for IdentityRegistry {
        fn pack_value(&self, value: Vec<u8>, sm_id: u32) -> Vec<u8> {
            let mut out = sm_id.to_le_bytes().to_vec();
            out.extend(value);
            out
        }
    }

    struct CountingTelemetry {
        submitted: AtomicU64,
        commit_ok: AtomicU64,
        commit_fail: AtomicU64,
        conflict: AtomicU64,
        lock_ok: AtomicBool,
    }

    impl CountingTelemetry {
        fn new() -> Arc<Self> {
            Arc::new(CountingTelemetry {
                submitted: AtomicU64::new(0),
                commit_ok: AtomicU64::new(0),
                commit_fail: AtomicU64::new(0),
                conflict: AtomicU64::new(0),
                lock_ok: AtomicBool::new(false),
            })
        }
    }

    impl Telemetry for CountingTelemetry {
        fn submitted(&self) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
        }
        fn commit_ok(&self, _latency_ms: u64) {
            self.commit_ok.fetch_add(1, Ordering::SeqCst);
        }
        fn commit_fail(&self) {
            self.commit_fail.fetch_add(1, Ordering::SeqCst);
        }
        fn conflict(&self) {
            self.conflict.fetch_add(1, Ordering::SeqCst);
        }
        fn lock_ok(&self, _wait_ms: u64) {
            self.lock_ok.store(true, Ordering::SeqCst);
        }
    }

    fn committer_with(script: Vec<TryCommitResult>, telemetry: Arc<CountingTelemetry>) -> Committer {
        let loop_ = ScriptedLoop::new(script);
        Committer::new(
            loop_.clone(),
            loop_,
            Arc::new(IdentityRegistry),
            telemetry,
            CommitConfig {
                timeout_ms: Some(1_000),
                ..Default::default()
            },
        )
    }

    // Scenario S1: happy path.
    #[test]
    fn happy_path_returns_ok_with_id() {
        let telemetry = CountingTelemetry::new();
        let committer = committer_with(vec![TryCommitResult::Ok(0)], telemetry.clone());

        let id = committer.submit(b"hello".to_vec()).expect("commit should succeed");
        assert_eq!(id, 7);
        assert_eq!(telemetry.submitted.load(Ordering::SeqCst), 1);
        assert_eq!(telemetry.commit_ok.load(Ordering::SeqCst), 1);
        assert!(telemetry.lock_ok.load(Ordering::SeqCst));
    }

    // Scenario S5: conflict, conflict, ok -> 3 attempts, final success.
    #[test]
    fn conflicts_retry_up_to_three_times_then_succeed() {
        let telemetry = CountingTelemetry::new();
        let committer = committer_with(
            vec![
                TryCommitResult::Conflict,
                TryCommitResult::Conflict,
                TryCommitResult::Ok(0),
            ],
            telemetry.clone(),
        );

        let (id, result) = committer.submit_with_id(b"v".to_vec());
        assert_eq!(result, TryCommitResult::Ok(id.unwrap()));
        assert_eq!(telemetry.conflict.load(Ordering::SeqCst), 2);
    }

    // Scenario S5 (master branch): master state machine never retries.
    #[test]
    fn master_state_machine_does_not_retry_on_conflict() {
        let telemetry = CountingTelemetry::new();
        let committer = committer_with(
            vec![
                TryCommitResult::Conflict,
                TryCommitResult::Ok(0), // would succeed if retried, but must not be reached
            ],
            telemetry.clone(),
        );

        let (_id, result) = committer.submit_with_ctx(
            b"v".to_vec(),
            SmCtx {
                sm_id: MASTER_STATE_MACHINE_ID,
                cookie: 0,
            },
        );
        assert_eq!(result, TryCommitResult::Conflict);
        assert_eq!(telemetry.conflict.load(Ordering::SeqCst), 1);
    }

    // Property 5: a loop that always conflicts triggers at most 3 cycles.
    #[test]
    fn always_conflict_caps_retries_at_three() {
        let telemetry = CountingTelemetry::new();
        let committer = committer_with(
            vec![
                TryCommitResult::Conflict,
                TryCommitResult::Conflict,
                TryCommitResult::Conflict,
            ],
            telemetry.clone(),
        );

        let (id, result) = committer.submit_with_id(b"v".to_vec());
        assert_eq!(result, TryCommitResult::Conflict);
        assert_eq!(id, None);
        assert_eq!(telemetry.conflict.load(Ordering::SeqCst), 3);
    }

    // Scenario S2 / invariant 2: admission reject surfaces with no wait.
    #[test]
    fn admission_reject_surfaces_as_too_many_threads_waiting() {
        let telemetry = CountingTelemetry::new();
        let committer = committer_with(vec![TryCommitResult::Ok(0)], telemetry.clone());
        committer.set_max_hold_threads(Some(0));

        let (id, result) = committer.submit_with_id(b"v".to_vec());
        assert_eq!(result, TryCommitResult::TooManyThreadsWaiting);
        assert_eq!(id, None);
    }

    // Scenario S4: deadline floor. A short enough configured timeout must
    // abort before publish once remaining time drops under 200ms.
    #[test]
    fn deadline_floor_aborts_before_publish() {
        let telemetry = CountingTelemetry::new();
        let loop_ = ScriptedLoop::new(vec![TryCommitResult::Ok(0)]);
        let committer = Committer::new(
            loop_.clone(),
            loop_,
            Arc::new(IdentityRegistry),
            telemetry,
            CommitConfig {
                timeout_ms: Some(1),
                ..Default::default()
            },
        );

        let (id, result) = committer.submit_with_id(b"v".to_vec());
        assert_eq!(result, TryCommitResult::Timeout);
        assert_eq!(id, None);
    }

    // A late result latched by an abandoned attempt must not leak into a
    // fresh submit's result; `publish` is the seam that owns discarding it.
    #[test]
    fn publish_discards_a_stale_latched_result() {
        let loop_ = ScriptedLoop::new(vec![TryCommitResult::Ok(0)]);

        // Simulate a late result the I/O loop wrote for an attempt whose
        // caller already gave up and stopped waiting.
        {
            let mut state = loop_.inner.lock().unwrap();
            state.result = Some(TryCommitResult::Ok(999));
        }

        loop_.publish(b"fresh".to_vec(), None, Some(1_000));
        loop_.notify();
        let result = loop_.await_result();
        assert_eq!(result, TryCommitResult::Ok(7));
    }
}
