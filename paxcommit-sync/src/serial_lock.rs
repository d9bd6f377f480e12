// A mutual-exclusion primitive augmented with a single condition. Rather
// than translate the C++ original's manual Lock()/UnLock()/WaitTime() API
// literally, the critical section's payload is carried as the generic
// parameter T: the lock *is* the only way to reach the data it protects, so
// "forgot to take the lock before touching the state" is a compile error
// instead of a runtime bug.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken,
    TimedOut,
}

pub struct SerialLock<T> {
    mutex: Mutex<T>,
    cv: Condvar,
}

impl<T> SerialLock<T> {
    pub fn new(value: T) -> Self {
        SerialLock {
            mutex: Mutex::new(value),
            cv: Condvar::new(),
        }
    }

    /// Enter the critical section. The section is left automatically when
    /// the returned guard drops; there is no separate `leave()` to forget.
    pub fn enter(&self) -> SerialLockGuard<'_, T> {
        SerialLockGuard {
            lock: self,
            guard: Some(self.mutex.lock().expect("serial lock poisoned")),
        }
    }
}

pub struct SerialLockGuard<'a, T> {
    lock: &'a SerialLock<T>,
    guard: Option<MutexGuard<'a, T>>,
}

impl<T> std::ops::Deref for SerialLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.guard.as_deref().expect("guard already consumed")
    }
}

impl<T> std::ops::DerefMut for SerialLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().expect("guard already consumed")
    }
}

impl<T> SerialLockGuard<'_, T> {
    /// Atomically release the section, block up to `timeout_ms`, and
    /// reacquire before returning. `timeout_ms == 0` returns immediately
    /// without ever releasing the section. Spurious wake-ups are possible;
    /// callers must re-test their condition.
    pub fn wait_for(&mut self, timeout_ms: u64) -> WaitOutcome {
        if timeout_ms == 0 {
            return WaitOutcome::TimedOut;
        }
        let guard = self.guard.take().expect("guard already consumed");
        let (guard, result) = self
            .lock
            .cv
            .wait_timeout(guard, Duration::from_millis(timeout_ms))
            .expect("serial lock poisoned");
        self.guard = Some(guard);
        if result.timed_out() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Woken
        }
    }

    /// Unblock all current waiters. Losers of the resulting race simply
    /// re-park; there is no fairness guarantee beyond the OS scheduler's.
    pub fn wake_all(&self) {
        self.lock.cv.notify_all();
    }
}
