//! Transport, scheduling and note-queue primitives: pure tick↔frame
//! arithmetic, the `TransportPosition` value object, the note queue, and
//! the minimal song/pattern model the scheduler walks. No locks, no audio
//! I/O — those live in `daw_engine`.

pub mod error;
pub mod note;
pub mod note_queue;
pub mod position;
pub mod song;
pub mod tick_clock;

pub use error::Error;
pub use note::{InstrumentHandle, METRONOME_INSTRUMENT_ID, MidiNote, NoteTemplate, ScheduledNote};
pub use note_queue::NoteQueue;
pub use position::{Label, TransportPosition};
pub use song::{AutomationPath, Column, LoopMode, Pattern, PatternId, PatternStore, Song, Timeline};
pub use tick_clock::{
    MAX_BPM, MIN_BPM, TempoMap, TempoMarker, clamp_bpm, compute_tick_size, frame_for_tick,
    round_tick_for_relocation, tick_for_frame,
};

/// Ticks per pattern-resolution-unit used throughout the scheduler (spec
/// §4.4). Also the modulus from which the `MAX_NOTES/16`, `MAX_NOTES/8`,
/// `MAX_NOTES/32` swing constants are derived.
pub const MAX_NOTES: f64 = 192.0;

/// Per-note and per-engine lead-lag scale, in ticks (spec GLOSSARY).
pub const LEAD_LAG_TICKS: f64 = 5.0;

/// Cap on the magnitude of any single humanize/swing/lead-lag offset, in
/// frames (spec §4.4).
pub const MAX_HUMANIZE_FRAMES: i64 = 2000;

/// Pattern-tick modulus at which the metronome fires (spec §4.4c / §8 S6).
pub const METRONOME_TICK_MODULUS: f64 = 48.0;
