//! Error taxonomy shared by every crate in this workspace that deals with
//! musical time. See spec §7 for the full taxonomy; the control-flow-only
//! `EndOfSong` case lives on `daw_engine::SchedulerOutcome` instead of here,
//! since it is never surfaced as a `Result::Err`.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum Error {
    #[error("invalid tempo: bpm={bpm}, resolution={resolution}")]
    InvalidTempo { bpm: f64, resolution: u32 },

    #[error("invalid tick: {tick}")]
    InvalidTick { tick: f64 },
}
