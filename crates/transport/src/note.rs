//! Note data as seen by the transport/scheduler core (spec §3). The sampler
//! voice itself is out of scope; [`InstrumentHandle`] only carries the
//! reference-counting contract the scheduler and the engine's dequeue path
//! need (spec §9: "notes as heap of raw pointers" → owned values with a
//! ref-count field on the instrument handle).

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Reserved id for the metronome's synthetic instrument (spec §4.4c).
pub const METRONOME_INSTRUMENT_ID: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct InstrumentHandle {
    id: u32,
    queued: Arc<AtomicI64>,
    pub random_pitch_factor: f32,
    pub pitch_offset: f32,
}

impl InstrumentHandle {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            queued: Arc::new(AtomicI64::new(0)),
            random_pitch_factor: 0.0,
            pitch_offset: 0.0,
        }
    }

    pub fn metronome() -> Self {
        Self::new(METRONOME_INSTRUMENT_ID)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Called once per note pushed into the scheduled heap.
    pub fn enqueue(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    /// Called once per note removed from the scheduled heap, whether it was
    /// played, dropped by probability gating, or flushed by `clear()`.
    pub fn dequeue(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn queued_count(&self) -> i64 {
        self.queued.load(Ordering::Acquire)
    }
}

impl PartialEq for InstrumentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A note as it sits inside a [`crate::song::Pattern`]: position is
/// pattern-local ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTemplate {
    pub instrument: InstrumentHandle,
    pub position: f64,
    pub velocity: f32,
    pub pan: f32,
    pub length: Option<f64>,
    pub pitch: f32,
    pub lead_lag: f32,
    pub probability: f32,
    pub note_off: bool,
    pub specific_component_id: Option<u32>,
}

impl NoteTemplate {
    pub fn new(instrument: InstrumentHandle, position: f64) -> Self {
        Self {
            instrument,
            position,
            velocity: 1.0,
            pan: 0.0,
            length: None,
            pitch: 0.0,
            lead_lag: 0.0,
            probability: 1.0,
            note_off: false,
            specific_component_id: None,
        }
    }
}

/// A note accepted from realtime MIDI/keyboard input, queued FIFO until its
/// absolute tick falls inside the scheduler's window (spec §4.3/§4.4 step 2).
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    pub instrument: InstrumentHandle,
    /// Absolute tick this note should sound at.
    pub position: f64,
    pub velocity: f32,
    pub pan: f32,
    pub length: Option<f64>,
    pub pitch: f32,
    pub note_off: bool,
}

/// A note materialized by the scheduler: absolute tick position, an
/// absolute start frame, and the combined swing/humanize/lead-lag offset
/// baked into `humanize_delay` (spec §3/§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNote {
    pub instrument: InstrumentHandle,
    pub position: f64,
    pub velocity: f32,
    pub pan: f32,
    pub length: Option<f64>,
    pub pitch: f32,
    pub lead_lag: f32,
    pub probability: f32,
    pub note_off: bool,
    pub specific_component_id: Option<u32>,
    pub humanize_delay: i64,
    pub note_start: i64,
}

impl ScheduledNote {
    pub fn from_template(
        template: &NoteTemplate,
        absolute_position: f64,
        humanize_delay: i64,
        note_start: i64,
    ) -> Self {
        Self {
            instrument: template.instrument.clone(),
            position: absolute_position,
            velocity: template.velocity,
            pan: template.pan,
            length: template.length,
            pitch: template.pitch,
            lead_lag: template.lead_lag,
            probability: template.probability,
            note_off: template.note_off,
            specific_component_id: template.specific_component_id,
            humanize_delay,
            note_start,
        }
    }

    pub fn from_midi(midi: &MidiNote, note_start: i64) -> Self {
        Self {
            instrument: midi.instrument.clone(),
            position: midi.position,
            velocity: midi.velocity,
            pan: midi.pan,
            length: midi.length,
            pitch: midi.pitch,
            lead_lag: 0.0,
            probability: 1.0,
            note_off: midi.note_off,
            specific_component_id: None,
            humanize_delay: 0,
            note_start,
        }
    }
}
