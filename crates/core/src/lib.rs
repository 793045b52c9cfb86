//! Thin glue layer between an embedder (GUI, CLI, OSC bridge) and the
//! transport/engine core: owns the `Engine`, the garbage collector for
//! anything shared with the audio thread, and a poll-driven surface so the
//! embedder never has to reach into `daw_engine` directly.

pub mod session;

pub use session::{PlaybackState, Session};
pub use daw_engine::{Event, EventConsumer, PlaybackMode, State};
pub use daw_transport::{MidiNote, Pattern, PatternId, Song};
