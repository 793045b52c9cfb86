//! # Session
//!
//! `Session` is the boundary between an embedder (GUI, CLI, OSC bridge) and
//! the `Engine`. It owns the engine, a `basedrop::Collector` for anything
//! shared with the audio thread, and a small amount of control-side state
//! (`PlaybackState`) that mirrors the engine's own `State` but is cheap to
//! read without touching the engine lock.
//!
//! ## Polling
//!
//! `poll()` drains the engine's event queue and should be called regularly
//! (e.g. once per UI frame) — it is the only place garbage collection runs,
//! mirroring `basedrop`'s "collect outside the audio thread" contract.
//!
//! ## What this is not
//!
//! `Session` does not know about samples, disk formats, or a pattern editor
//! — those are out of scope for this core (see the crate-level docs of
//! `daw_engine`/`daw_transport`). It exists only to make `Engine` pleasant
//! to drive from a single control thread.

use daw_engine::{
    DriverAdapter, Engine, EngineConfig, Event, EventConsumer, PlaybackMode, RendererAdapter, State,
};
use daw_transport::{MidiNote, Song};

/// Control-side mirror of the engine's `State`, collapsed to what an
/// embedder actually needs to render a transport bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Owns the engine and the collector for anything shared with the audio
/// thread. `!Send`-by-convention: keep it on a single control thread and
/// drive the real audio thread through the `DriverAdapter`/`RendererAdapter`
/// supplied at construction.
pub struct Session {
    engine: Engine,
    events: EventConsumer,
    collector: basedrop::Collector,
    playback_state: PlaybackState,
    last_known_tick: f64,
}

impl Session {
    /// Boots the engine against the given driver/renderer pair and song.
    /// `driver`/`renderer` are typically `NullDriver`/`NullRenderer` in
    /// tests, or real adapters supplied by the embedder in production.
    pub fn new(
        driver: Box<dyn DriverAdapter>,
        renderer: Box<dyn RendererAdapter>,
        config: EngineConfig,
        song: Song,
    ) -> anyhow::Result<Self> {
        let buffer_size = config.buffer_size;
        let (mut engine, events) = Engine::new(driver, renderer, config);
        engine.start_audio_drivers(buffer_size)?;
        engine.set_song(song)?;

        Ok(Self {
            engine,
            events,
            collector: basedrop::Collector::new(),
            playback_state: PlaybackState::Stopped,
            last_known_tick: 0.0,
        })
    }

    pub fn play(&mut self) {
        self.engine.play();
        self.playback_state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        self.engine.stop();
        self.playback_state = PlaybackState::Paused;
    }

    pub fn stop(&mut self) {
        self.engine.stop();
        self.engine.locate(0.0);
        self.playback_state = PlaybackState::Stopped;
    }

    pub fn seek(&mut self, tick: f64) {
        self.engine.locate(tick);
        self.last_known_tick = tick;
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.engine.set_next_bpm(bpm);
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.engine.set_mode(mode);
    }

    pub fn update_song(&mut self, song: Song) -> anyhow::Result<()> {
        self.engine.update_song_size(song)?;
        Ok(())
    }

    /// Forwards a realtime MIDI/keyboard note into the engine's MIDI FIFO.
    pub fn push_midi(&mut self, note: MidiNote) {
        self.engine.push_midi(note);
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    pub fn engine_state(&self) -> State {
        self.engine.state()
    }

    /// Drains the engine's event queue, applying anything that changes
    /// control-side state (e.g. an automatic `State::Ready` at end-of-song),
    /// and runs garbage collection on whatever the audio thread dropped
    /// since the last call. Call regularly from the UI loop.
    pub fn poll(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Some(event) = self.events.pop() {
            if let Event::State(State::Ready) = event {
                self.playback_state = PlaybackState::Stopped;
            }
            drained.push(event);
        }
        self.collector.collect();
        drained
    }

    /// Runs `n_frames` of the process callback directly — only meaningful
    /// when the session was built with a synchronous driver (`FakeDriver`);
    /// a real driver calls `Engine::process` from its own callback thread.
    pub fn process(&mut self, n_frames: usize) {
        self.engine.process(n_frames);
    }
}
