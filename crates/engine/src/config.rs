//! Configuration knobs recognised by the engine (spec §6). Persisting this
//! to disk is out of scope; it's a typed, validated bag of values an
//! embedder constructs however it likes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiDriver {
    Alsa,
    PortMidi,
    CoreMidi,
    JackMidi,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub buffer_size: u32,
    pub audio_driver: crate::driver::DriverTag,
    pub midi_driver: MidiDriver,
    pub use_metronome: bool,
    pub metronome_volume: f32,
    /// `-1` = all channels; `0..=15` otherwise.
    pub midi_channel_filter: i8,
    pub midi_note_off_ignore: bool,
    pub midi_fixed_mapping: bool,
    pub play_selected_instrument: bool,
    pub midi_discard_note_after_action: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            audio_driver: crate::driver::DriverTag::Auto,
            midi_driver: MidiDriver::None,
            use_metronome: false,
            metronome_volume: 0.8,
            midi_channel_filter: -1,
            midi_note_off_ignore: false,
            midi_fixed_mapping: false,
            play_selected_instrument: false,
            midi_discard_note_after_action: false,
        }
    }
}
