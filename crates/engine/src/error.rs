//! Engine-level error taxonomy (spec §7). `EndOfSong` is control flow, not a
//! user-facing error, so it lives on [`crate::scheduler::SchedulerOutcome`]
//! instead of here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown audio driver tag: {0}")]
    UnknownDriver(String),

    #[error("driver init failed with code {0}")]
    DriverInitFailure(i32),

    #[error("driver connect failed with code {0}")]
    DriverConnectFailure(i32),

    #[error("state rule violation: {0}")]
    StateRuleViolation(String),

    #[error(transparent)]
    Transport(#[from] daw_transport::Error),

    #[error("timed out acquiring the engine lock")]
    LockTimeout,
}
