// Illustrative client of paxcommit-core, standing in for phxelection's
// sample main(): wires a Committer to a toy proposer running on its own
// thread, instead of a real Paxos group, and drives it through a normal
// commit, a conflict that resolves on retry, and a master-state-machine
// commit that does not retry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use paxcommit_core::{
    CommitConfig, CommitContext, Committer, IoLoop, NoopTelemetry, SmCtx, StateMachineRegistry,
    TryCommitResult, MASTER_STATE_MACHINE_ID,
};

/// A toy stand-in for a running Paxos group: resolves every publish
/// according to a scripted queue of outcomes, one per commit attempt,
/// from a background thread so publish/notify/await_result behave like
/// the real asynchronous round trip they model.
struct ToyProposer {
    state: Mutex<ProposerState>,
    cv: Condvar,
    next_id: AtomicU64,
}

struct ProposerState {
    script: VecDeque<TryCommitResult>,
    pending: bool,
    result: Option<TryCommitResult>,
    shutdown: bool,
}

impl ToyProposer {
    fn new(script: Vec<TryCommitResult>) -> Arc<Self> {
        Arc::new(ToyProposer {
            state: Mutex::new(ProposerState {
                script: script.into(),
                pending: false,
                result: None,
                shutdown: false,
            }),
            cv: Condvar::new(),
            next_id: AtomicU64::new(1),
        })
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().expect("proposer state poisoned");
        state.shutdown = true;
        self.cv.notify_all();
    }
}

impl CommitContext for ToyProposer {
    fn publish(&self, packed_value: Vec<u8>, sm_ctx: Option<SmCtx>, _timeout_ms: Option<u64>) {
        tracing::info!(target: "paxcommit", bytes = packed_value.len(), ?sm_ctx, "publish");
        let mut state = self.state.lock().expect("proposer state poisoned");
        state.result = None;
        state.pending = true;
        self.cv.notify_all();
    }

    fn await_result(&self) -> TryCommitResult {
        let mut state = self.state.lock().expect("proposer state poisoned");
        while state.result.is_none() {
            state = self.cv.wait(state).expect("proposer state poisoned");
        }
        state.result.take().expect("result checked above")
    }
}

impl IoLoop for ToyProposer {
    fn notify(&self) {
        self.cv.notify_all();
    }
}

/// Runs on its own thread, standing in for phxpaxos's single-threaded I/O
/// loop: wakes on every notify, and for any pending publish resolves the
/// next scripted outcome.
fn run_proposer_loop(proposer: Arc<ToyProposer>) {
    loop {
        let mut state = proposer.state.lock().expect("proposer state poisoned");
        loop {
            if state.shutdown {
                return;
            }
            if state.pending {
                break;
            }
            state = proposer.cv.wait(state).expect("proposer state poisoned");
        }
        state.pending = false;
        let outcome = state
            .script
            .pop_front()
            .unwrap_or(TryCommitResult::Internal("script exhausted".to_string()));
        state.result = Some(match outcome {
            TryCommitResult::Ok(_) => {
                TryCommitResult::Ok(proposer.next_id.fetch_add(1, Ordering::SeqCst))
            }
            other => other,
        });
        proposer.cv.notify_all();
    }
}

struct PassthroughRegistry;
impl StateMachineRegistry for PassthroughRegistry {
    fn pack_value(&self, value: Vec<u8>, sm_id: u32) -> Vec<u8> {
        let mut out = sm_id.to_le_bytes().to_vec();
        out.extend(value);
        out
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let script = vec![
        TryCommitResult::Ok(0),       // a normal commit
        TryCommitResult::Conflict,    // conflicts once...
        TryCommitResult::Ok(0),       // ...then succeeds on retry
        TryCommitResult::Conflict,    // a master-lease commit that never retries
    ];
    let proposer = ToyProposer::new(script);
    let loop_handle = {
        let proposer = proposer.clone();
        thread::spawn(move || run_proposer_loop(proposer))
    };

    let committer = Committer::new(
        proposer.clone(),
        proposer.clone(),
        Arc::new(PassthroughRegistry),
        Arc::new(NoopTelemetry),
        CommitConfig {
            timeout_ms: Some(5_000),
            ..Default::default()
        },
    );

    match committer.submit(b"create table realm.accounts".to_vec()) {
        Ok(id) => println!("normal commit: instance {id}"),
        Err(result) => println!("normal commit failed: {result:?}"),
    }

    match committer.submit(b"update realm.accounts set balance = balance - 1".to_vec()) {
        Ok(id) => println!("contended commit: instance {id} (resolved after a conflict)"),
        Err(result) => println!("contended commit failed: {result:?}"),
    }

    let (_id, result) = committer.submit_with_ctx(
        b"lease renewal".to_vec(),
        SmCtx {
            sm_id: MASTER_STATE_MACHINE_ID,
            cookie: 0,
        },
    );
    println!("master lease commit: {result:?} (no retry attempted)");

    proposer.shutdown();
    loop_handle.join().expect("proposer thread panicked");
}
