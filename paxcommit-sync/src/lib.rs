mod serial_lock;
mod wait_lock;

pub use serial_lock::{SerialLock, SerialLockGuard, WaitOutcome};
pub use wait_lock::{AcquireOutcome, WaitLock, WaitLockStats};
