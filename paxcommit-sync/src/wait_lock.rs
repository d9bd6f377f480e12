// WaitLock: an admission-controlled mutex with adaptive load shedding.
// Protects a single logical resource (the commit slot) while capping the
// number of parked callers and randomly shedding load once the rolling
// average acquisition latency crosses a threshold.

use crate::serial_lock::SerialLock;
use paxcommit_base::steady_ms;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Observations between reject-rate recalculations.
const WINDOW: u64 = 250;
const MAX_REJECT_RATE: u8 = 98;
const REJECT_RATE_STEP: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Lock acquired; caller now holds the resource.
    Admitted { wait_ms: u64 },
    /// Denied by the admission cap or the adaptive shedder. `wait_ms` is
    /// always 0 here: this is how callers tell an admission-reject apart
    /// from a timeout, even though the admission check itself costs some
    /// nonzero time.
    Rejected,
    /// Parked for the resource but `timeout_ms` elapsed first.
    TimedOut { wait_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct WaitLockStats {
    pub waiting: u64,
    pub avg_ms: u64,
    pub reject_rate: u8,
}

struct WaitLockState {
    holding: bool,
    waiting: u64,
    max_waiting: Option<u64>,
    wait_threshold_ms: Option<u64>,
    sum_ms: u64,
    count: u64,
    avg_ms: u64,
    reject_rate: u8,
    rng: StdRng,
}

impl WaitLockState {
    /// Admission check, run inside the critical section.
    fn can_lock(&mut self) -> bool {
        if let Some(max) = self.max_waiting {
            if self.waiting >= max {
                return false;
            }
        }
        match self.wait_threshold_ms {
            None => true,
            Some(_) => self.rng.gen_range(0..100) >= self.reject_rate,
        }
    }

    /// Feed one acquisition's elapsed time into the rolling window and,
    /// on window close, nudge the reject rate towards or away from the
    /// configured latency threshold.
    fn refresh_reject_rate(&mut self, elapsed_ms: u64) {
        let Some(threshold) = self.wait_threshold_ms else {
            return;
        };

        self.sum_ms += elapsed_ms;
        self.count += 1;
        if self.count < WINDOW {
            return;
        }

        self.avg_ms = self.sum_ms / self.count;
        self.sum_ms = 0;
        self.count = 0;

        if self.avg_ms > threshold {
            self.reject_rate = (self.reject_rate + REJECT_RATE_STEP).min(MAX_REJECT_RATE);
        } else if self.reject_rate > 0 {
            self.reject_rate = self.reject_rate.saturating_sub(REJECT_RATE_STEP);
        }
    }
}

pub struct WaitLock {
    lock: SerialLock<WaitLockState>,
}

impl WaitLock {
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }

    /// Construct with an explicit RNG seed, for deterministic tests of the
    /// adaptive shedder. Each WaitLock gets its own stream instead of
    /// sharing a process-global one, so instances never interfere and a
    /// test can reproduce an exact sequence of admit/reject decisions.
    pub fn with_seed(seed: u64) -> Self {
        WaitLock {
            lock: SerialLock::new(WaitLockState {
                holding: false,
                waiting: 0,
                max_waiting: None,
                wait_threshold_ms: None,
                sum_ms: 0,
                count: 0,
                avg_ms: 0,
                reject_rate: 0,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    pub fn set_max_waiting(&self, n: Option<u64>) {
        self.lock.enter().max_waiting = n;
    }

    pub fn set_wait_threshold(&self, ms: Option<u64>) {
        self.lock.enter().wait_threshold_ms = ms;
    }

    pub fn stats(&self) -> WaitLockStats {
        let state = self.lock.enter();
        WaitLockStats {
            waiting: state.waiting,
            avg_ms: state.avg_ms,
            reject_rate: state.reject_rate,
        }
    }

    /// `timeout_ms = None` waits indefinitely, re-parking in <=1s slices so
    /// the call stays responsive to external shutdown signalling.
    pub fn acquire(&self, timeout_ms: Option<u64>) -> AcquireOutcome {
        let begin = steady_ms();
        let mut state = self.lock.enter();

        if !state.can_lock() {
            return AcquireOutcome::Rejected;
        }

        state.waiting += 1;
        let got = loop {
            if !state.holding {
                break true;
            }
            let elapsed = steady_ms().saturating_sub(begin);
            if let Some(t) = timeout_ms {
                if elapsed >= t {
                    break false;
                }
            }
            let slice = match timeout_ms {
                None => 1000,
                Some(t) => (t - elapsed).min(1000),
            };
            state.wait_for(slice);
        };
        state.waiting -= 1;

        let elapsed = steady_ms().saturating_sub(begin);
        state.refresh_reject_rate(elapsed);

        if got {
            state.holding = true;
        }
        drop(state);

        if got {
            AcquireOutcome::Admitted { wait_ms: elapsed }
        } else {
            AcquireOutcome::TimedOut { wait_ms: elapsed }
        }
    }

    /// Clear `holding` and wake every parked waiter; only this call may
    /// clear the flag.
    pub fn release(&self) {
        let mut state = self.lock.enter();
        state.holding = false;
        state.wake_all();
    }
}

impl Default for WaitLock {
    fn default() -> Self {
        Self::new()
    }
}
