//! The `RendererAdapter` boundary (spec §6): the sampler/synth voice
//! renderer is out of scope for this core, so this crate only defines the
//! trait the `Engine` drives and a `NullRenderer` it uses in its own tests.

use daw_transport::ScheduledNote;

pub trait RendererAdapter: Send {
    fn note_on(&mut self, note: &ScheduledNote);
    fn stop_playing_notes(&mut self);
    fn handle_timeline_or_tempo_change(&mut self);
    fn handle_song_size_change(&mut self);
    /// Render `n_frames` into `out_l`/`out_r`, accumulating on top of
    /// whatever is already there.
    fn process(&mut self, n_frames: usize, out_l: &mut [f32], out_r: &mut [f32]);
}

/// Renders silence; counts `note_on` calls so tests can assert on delivery
/// order/count without a real sampler.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub notes_received: Vec<ScheduledNote>,
    pub stop_calls: u32,
}

impl RendererAdapter for NullRenderer {
    fn note_on(&mut self, note: &ScheduledNote) {
        self.notes_received.push(note.clone());
    }

    fn stop_playing_notes(&mut self) {
        self.stop_calls += 1;
    }

    fn handle_timeline_or_tempo_change(&mut self) {}

    fn handle_song_size_change(&mut self) {}

    fn process(&mut self, _n_frames: usize, _out_l: &mut [f32], _out_r: &mut [f32]) {}
}
