// A monotonic millisecond clock, standing in for phxpaxos's
// Time::GetSteadyClockMS(). Backed by std::time::Instant so it can never
// jump backwards under clock adjustments, which the WaitLock's rolling
// average and the Committer's once-a-second status log both depend on.

use std::sync::OnceLock;
use std::time::Instant;

fn epoch() -> &'static Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now)
}

pub fn steady_ms() -> u64 {
    epoch().elapsed().as_millis() as u64
}
