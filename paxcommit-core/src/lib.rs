mod collab;
mod committer;
mod config;
mod result;

pub use collab::{CommitContext, IoLoop, NoopTelemetry, SmCtx, StateMachineRegistry, Telemetry};
pub use committer::Committer;
pub use config::CommitConfig;
pub use result::{conflict_is_retryable, TryCommitResult, MASTER_STATE_MACHINE_ID};
