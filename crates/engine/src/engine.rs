//! The `Engine`: state machine, the `process` realtime callback, and the two
//! housekeeping routines (`update_bpm_and_tick_size`,
//! `update_song_size`/`update_playing_patterns`) that keep the audible and
//! queuing transport positions consistent while a song is edited or its
//! tempo changes underneath playback (spec §4.5). Grounded in
//! `original_source`'s `AudioEngine::updateBpmAndTickSize`,
//! `calculateTransportOffsetOnBpmChange` and `updateSongSize`.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use daw_transport::{
    Label, LoopMode, MAX_HUMANIZE_FRAMES, NoteQueue, TempoMap, TransportPosition, frame_for_tick,
    tick_for_frame,
};
use parking_lot::ReentrantMutex;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::EngineConfig;
use crate::driver::DriverAdapter;
use crate::error::Error;
use crate::event::{Event, EventConsumer, EventProducer, event_channel};
use crate::renderer::RendererAdapter;
use crate::scheduler::{PlaybackMode, Scheduler, SchedulerOutcome};
use crate::state::State;

/// Everything the engine lock protects (spec §5): engine state, both
/// transport positions, playing/next pattern sets, the note queues, the
/// `nextBpm` field. The driver and renderer sit outside the lock since they
/// are only ever touched from the single audio thread that calls `process`.
struct Locked {
    state: State,
    next_state: Option<State>,
    audible: TransportPosition,
    queuing: TransportPosition,
    scheduler: Scheduler,
    note_queue: NoteQueue,
    song: Option<daw_transport::Song>,
    mode: PlaybackMode,
    next_bpm: f64,
    tempo_map: TempoMap,
    metronome: daw_transport::InstrumentHandle,
    realtime_frame: i64,
    rng: StdRng,
    running_tests: bool,
    events: EventProducer,
}

impl Locked {
    /// The tempo map the scheduler should integrate over this cycle: a
    /// full `Timeline` when song mode has one active (so a tick window
    /// spanning a tempo-marker boundary still converts correctly), else a
    /// flat map at `next_bpm` (spec §4.5.3's priority chain resolves the
    /// actual bpm before this is built).
    fn tempo_map_for(&self, new_bpm: f64) -> TempoMap {
        match self.song.as_ref() {
            Some(s) if s.timeline.enabled && self.mode == PlaybackMode::Song => TempoMap::Timeline(
                s.timeline
                    .markers
                    .iter()
                    .map(|(col, bpm)| daw_transport::TempoMarker {
                        start_tick: s.tick_for_column(*col),
                        bpm: *bpm,
                    })
                    .collect(),
            ),
            _ => TempoMap::Constant(new_bpm),
        }
    }
}

/// Recognised realtime driver failure classes for `process`'s lock-acquire
/// step (spec §4.5.2 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Audio rendered normally (or silence, if not playing).
    Ok,
    /// Lock could not be acquired in the slack window; caller should retry
    /// this same buffer (only meaningful for a disk-writer driver).
    Retry,
}

/// The transport/scheduling core's top-level object (spec §3/§4.5). Wraps a
/// process-wide recursive-timed mutex (spec §5) around everything mutated
/// off the audio thread, and drives a `DriverAdapter`/`RendererAdapter` pair
/// supplied by the embedder.
pub struct Engine {
    locked: ReentrantMutex<RefCell<Locked>>,
    driver: Box<dyn DriverAdapter>,
    renderer: Box<dyn RendererAdapter>,
    config: EngineConfig,
    last_process_time: Duration,
    max_process_time: Duration,
}

impl Engine {
    pub fn new(
        driver: Box<dyn DriverAdapter>,
        renderer: Box<dyn RendererAdapter>,
        config: EngineConfig,
    ) -> (Self, EventConsumer) {
        let (events_tx, events_rx) = event_channel(256);
        let sample_rate = driver.sample_rate().max(1);
        let buffer_frames = config.buffer_size as u64;
        let max_process_time =
            Duration::from_secs_f64(buffer_frames as f64 / sample_rate as f64);

        let engine = Self {
            locked: ReentrantMutex::new(RefCell::new(Locked {
                state: State::Uninitialized,
                next_state: None,
                audible: TransportPosition::new(Label::Audible),
                queuing: TransportPosition::new(Label::Queuing),
                scheduler: Scheduler::new(),
                note_queue: NoteQueue::new(),
                song: None,
                mode: PlaybackMode::Pattern,
                next_bpm: 120.0,
                tempo_map: TempoMap::Constant(120.0),
                metronome: daw_transport::InstrumentHandle::metronome(),
                realtime_frame: 0,
                rng: StdRng::seed_from_u64(0xD00D),
                running_tests: false,
                events: events_tx,
            })),
            driver,
            renderer,
            config,
            last_process_time: Duration::ZERO,
            max_process_time,
        };
        (engine, events_rx)
    }

    pub fn state(&self) -> State {
        let guard = self.locked.lock();
        guard.borrow().state
    }

    /// Current audible-head tick, frame and song column. Read-only — an
    /// embedder polls these for a transport display; nothing in this crate
    /// mutates position through this path.
    pub fn audible_position(&self) -> (f64, i64, i32) {
        let guard = self.locked.lock();
        let inner = guard.borrow();
        (inner.audible.tick, inner.audible.frame, inner.audible.column)
    }

    fn transition_to(&self, to: State) -> Result<(), Error> {
        let guard = self.locked.lock();
        let mut inner = guard.borrow_mut();
        if !inner.state.can_transition_to(to) {
            tracing::warn!(from = ?inner.state, to = ?to, "illegal engine state transition");
            return Err(Error::StateRuleViolation(format!(
                "{:?} -> {:?} is not a legal transition",
                inner.state, to
            )));
        }
        inner.state = to;
        Ok(())
    }

    /// `startAudioDrivers` (spec §4.5.1): initializes and connects the
    /// driver, landing in `Prepared` (no song) or `Ready` (song already set).
    pub fn start_audio_drivers(&mut self, buffer_size: u32) -> Result<(), Error> {
        self.driver.init(buffer_size)?;
        self.driver.connect()?;
        let guard = self.locked.lock();
        let has_song = guard.borrow().song.is_some();
        drop(guard);
        self.transition_to(State::Initialized).ok();
        self.transition_to(if has_song { State::Ready } else { State::Prepared })
    }

    pub fn stop_audio_drivers(&mut self) {
        self.driver.disconnect();
        let guard = self.locked.lock();
        guard.borrow_mut().state = State::Initialized;
    }

    pub fn set_song(&self, song: daw_transport::Song) -> Result<(), Error> {
        let guard = self.locked.lock();
        {
            let mut inner = guard.borrow_mut();
            inner.song = Some(song);
        }
        drop(guard);
        self.transition_to(State::Ready)
    }

    pub fn remove_song(&self) -> Result<(), Error> {
        let guard = self.locked.lock();
        guard.borrow_mut().song = None;
        drop(guard);
        self.transition_to(State::Prepared)
    }

    /// `play()` only arms the `nextState` latch (spec §4.5.1): the audio
    /// thread applies it at the top of the next `process` call.
    pub fn play(&self) {
        let guard = self.locked.lock();
        guard.borrow_mut().next_state = Some(State::Playing);
    }

    pub fn stop(&self) {
        let guard = self.locked.lock();
        guard.borrow_mut().next_state = Some(State::Ready);
    }

    pub fn run_tests(&self) {
        let guard = self.locked.lock();
        let mut inner = guard.borrow_mut();
        inner.running_tests = inner.state == State::Playing;
        inner.next_state = Some(State::Testing);
    }

    pub fn stop_tests(&self) {
        let guard = self.locked.lock();
        let inner = guard.borrow();
        let back_to = if inner.running_tests {
            State::Playing
        } else {
            State::Ready
        };
        drop(inner);
        guard.borrow_mut().next_state = Some(back_to);
    }

    /// `locate(tick)`: relocates both transport positions. Rounds the
    /// relocated tick per spec §4.4's off-by-one-avoidance rule, and
    /// recomputes `frame` alongside `tick` on both heads so `I2`
    /// (`frameToTick(P.frame) == P.tick`) holds immediately after the call
    /// rather than only once the next `process` cycle re-derives it.
    pub fn locate(&self, tick: f64) {
        let rounded = daw_transport::round_tick_for_relocation(tick.max(0.0));
        let guard = self.locked.lock();
        let mut inner = guard.borrow_mut();
        let sample_rate = self.driver.sample_rate();
        let resolution = inner.song.as_ref().map(|s| s.resolution).unwrap_or(48);
        let tempo_map = inner.tempo_map.clone();

        for pos in [&mut inner.audible, &mut inner.queuing] {
            pos.tick = rounded;
            if let Ok((frame, mismatch)) = frame_for_tick(&tempo_map, sample_rate, resolution, rounded)
            {
                pos.frame = frame;
                pos.tick_mismatch = mismatch;
            }
        }
        inner.events.push(Event::Relocation);
    }

    pub fn set_next_bpm(&self, bpm: f64) {
        let clamped = daw_transport::clamp_bpm(bpm);
        let guard = self.locked.lock();
        guard.borrow_mut().next_bpm = clamped;
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        let guard = self.locked.lock();
        guard.borrow_mut().mode = mode;
    }

    /// `pushMidi` (spec §4.3/§6): the realtime MIDI/keyboard input path.
    /// Takes the engine lock itself — callers are expected to invoke this
    /// directly from their input callback rather than holding the lock
    /// across it.
    pub fn push_midi(&self, note: daw_transport::MidiNote) {
        let guard = self.locked.lock();
        guard.borrow_mut().note_queue.push_midi(note);
    }

    /// `updateBpmAndTickSize` (spec §4.5.3): priority chain external master
    /// clock > Timeline marker at `P.column` > `nextBpm`. On tick-size
    /// change, invalidates the cached lead-lag factor and calls
    /// `calculate_transport_offset_on_bpm_change`.
    fn update_bpm_and_tick_size(&self, inner: &mut Locked, sample_rate: u32, label: Label) {
        if !matches!(inner.state, State::Playing | State::Ready | State::Testing) {
            return;
        }

        let resolution = inner.song.as_ref().map(|s| s.resolution).unwrap_or(48);
        let pos = match label {
            Label::Audible => &inner.audible,
            Label::Queuing => &inner.queuing,
        };
        let old_bpm = pos.bpm;

        let new_bpm = if self.driver.is_external_master() {
            self.driver.master_bpm().unwrap_or(old_bpm)
        } else if let Some(song) = inner.song.as_ref() {
            song.timeline
                .bpm_at_column(pos.column)
                .unwrap_or(inner.next_bpm)
        } else {
            inner.next_bpm
        };
        let new_bpm = daw_transport::clamp_bpm(new_bpm);

        let tempo_changed = new_bpm != old_bpm;
        if tempo_changed {
            inner.events.push(Event::TempoChanged);
        }

        let old_tick_size = pos.tick_size;
        let new_tick_size = match daw_transport::compute_tick_size(sample_rate, new_bpm, resolution)
        {
            Ok(ts) => ts,
            Err(err) => {
                tracing::error!(%err, "failed to recompute tick size");
                return;
            }
        };

        let pos = match label {
            Label::Audible => &mut inner.audible,
            Label::Queuing => &mut inner.queuing,
        };
        pos.bpm = new_bpm;
        if new_tick_size == old_tick_size {
            return;
        }
        pos.tick_size = new_tick_size;
        inner.scheduler.invalidate_lead_lag_factor();
        inner.tempo_map = inner.tempo_map_for(new_bpm);

        self.calculate_transport_offset_on_bpm_change(inner, sample_rate, resolution, label);
    }

    fn calculate_transport_offset_on_bpm_change(
        &self,
        inner: &mut Locked,
        sample_rate: u32,
        resolution: u32,
        label: Label,
    ) {
        let tempo_map = inner.tempo_map.clone();
        let last_tick_end = inner.scheduler.last_tick_end();
        let pos = match label {
            Label::Audible => &mut inner.audible,
            Label::Queuing => &mut inner.queuing,
        };

        let (new_frame, mismatch) = match frame_for_tick(&tempo_map, sample_rate, resolution, pos.tick)
        {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(%err, "failed to recompute frame on bpm change");
                return;
            }
        };
        pos.tick_mismatch = mismatch;
        pos.frame_offset_tempo = (new_frame - pos.frame) as f64 + pos.frame_offset_tempo;

        if last_tick_end != 0.0 {
            let lookahead = MAX_HUMANIZE_FRAMES + 1;
            if let Ok(new_tick_end) =
                tick_for_frame(&tempo_map, sample_rate, resolution, new_frame + lookahead)
            {
                pos.tick_offset_queuing = new_tick_end - last_tick_end;
            }
        }

        if pos.frame != new_frame {
            pos.frame = new_frame;
        }
    }

    /// `updateSongSize`/`updatePlayingPatterns` (spec §4.5.4): preserves
    /// `(column, patternTickPosition)` across a song edit by recomputing
    /// which column now holds the same musical position.
    pub fn update_song_size(&self, new_song: daw_transport::Song) -> Result<(), Error> {
        let guard = self.locked.lock();
        let mut inner = guard.borrow_mut();

        let Some(old_song) = inner.song.clone() else {
            inner.song = Some(new_song);
            return Ok(());
        };

        let old_size = old_song.size_in_ticks();
        let new_size = new_song.size_in_ticks();
        let tempo_map = inner.tempo_map.clone();
        let sample_rate = self.driver.sample_rate();

        for (pos, _label) in [(&mut inner.audible, Label::Audible), (&mut inner.queuing, Label::Queuing)] {
            let old_column = pos.column;
            let repetitions = if old_size > 0.0 {
                (pos.tick / old_size).floor()
            } else {
                0.0
            };
            let stripped_tick = if old_size > 0.0 {
                pos.tick.rem_euclid(old_size)
            } else {
                pos.tick
            };

            let old_start_tick = if old_column >= 0 {
                old_song.tick_for_column(old_column as usize)
            } else {
                0.0
            };
            let new_start_tick = if old_column >= 0 && (old_column as usize) < new_song.columns.len()
            {
                new_song.tick_for_column(old_column as usize)
            } else {
                // Column no longer exists: end-of-song unless looping.
                pos.column = -1;
                old_start_tick
            };

            let delta = new_start_tick - old_start_tick;
            let shifted = stripped_tick + delta;
            let absolute_tick = shifted + repetitions * new_size;

            let tick_delta = absolute_tick - pos.tick;
            pos.tick_offset_song_size = ((pos.tick_offset_song_size + tick_delta) * 1e8).round() / 1e8;
            pos.tick = absolute_tick;

            // Recompute frame from the shifted tick so frame/tick stay
            // paired (mirrors the original calling `updateTransportPosition`
            // with both the new tick and its corresponding frame).
            if let Ok((frame, mismatch)) =
                frame_for_tick(&tempo_map, sample_rate, new_song.resolution, absolute_tick)
            {
                pos.frame = frame;
                pos.tick_mismatch = mismatch;
            }
        }

        if inner.audible.column == -1 && old_song.loop_mode != LoopMode::Enabled {
            inner.next_state = Some(State::Ready);
        }

        // Shift in-flight notes by the song-size offset, mirroring the
        // original's walk of `songNoteQueue` (spec §4.5.4 step 6).
        let tick_delta_floor = inner.queuing.tick_offset_song_size.floor();
        if tick_delta_floor != 0.0 {
            let tempo_map = inner.tempo_map.clone();
            let resolution = inner.song.as_ref().map(|s| s.resolution).unwrap_or(48);
            let sample_rate = self.driver.sample_rate();
            let mut shifted = Vec::new();
            while let Some(mut note) = inner.note_queue.pop_scheduled() {
                let new_position = (note.position + tick_delta_floor).max(0.0);
                if let Ok((frame, _)) =
                    frame_for_tick(&tempo_map, sample_rate, resolution, new_position)
                {
                    note.position = new_position;
                    note.note_start = frame;
                }
                shifted.push(note);
            }
            for note in shifted {
                inner.note_queue.push_scheduled(note);
            }
        }

        inner.song = Some(new_song);
        inner.events.push(Event::SongSizeChanged);
        self.update_playing_patterns(&mut inner);
        Ok(())
    }

    fn update_playing_patterns(&self, inner: &mut Locked) {
        let Some(song) = inner.song.clone() else { return };
        for pos in [&mut inner.audible, &mut inner.queuing] {
            if pos.column >= 0 {
                let ids = song.playing_patterns_at_column(pos.column as usize);
                pos.playing_patterns = ids.into_iter().collect();
            }
        }
        inner.events.push(Event::PlayingPatternsChanged);
    }

    /// Keeps the audible position's `column`/`pattern_tick_position` in
    /// step with its `tick` once playback has actually advanced, mirroring
    /// `original_source`'s `updateTransportPosition` being called on
    /// `m_pTransportPosition` (not just the queuing position) every cycle.
    fn update_audible_column(&self, inner: &mut Locked, mode: PlaybackMode, resolution: u32) {
        match mode {
            PlaybackMode::Song => {
                let Some(song) = inner.song.clone() else { return };
                match song.column_for_tick(inner.audible.tick) {
                    Some((column, pattern_start_tick)) => {
                        inner.audible.column = column as i32;
                        inner.audible.pattern_start_tick = pattern_start_tick;
                        let pattern_size = song.pattern_size_at_column(column, daw_transport::MAX_NOTES);
                        let sample_rate = self.driver.sample_rate();
                        let _ = inner
                            .audible
                            .recompute(sample_rate, resolution, [pattern_size], daw_transport::MAX_NOTES);
                    }
                    None => inner.audible.column = -1,
                }
            }
            PlaybackMode::Pattern => {
                let pattern_size = if inner.audible.pattern_size > 0.0 {
                    inner.audible.pattern_size
                } else {
                    daw_transport::MAX_NOTES
                };
                inner.audible.pattern_size = pattern_size;
                inner.audible.pattern_tick_position =
                    (inner.audible.tick - inner.audible.pattern_start_tick).rem_euclid(pattern_size);
            }
        }
    }

    /// The realtime audio callback contract (spec §4.5.2). `n_frames` is the
    /// buffer size requested by the driver this cycle.
    pub fn process(&mut self, n_frames: usize) -> ProcessOutcome {
        let cycle_start = Instant::now();
        self.driver.clear_per_track_buffers(n_frames);

        let slack = self
            .max_process_time
            .saturating_sub(self.last_process_time);
        let Some(guard) = self.locked.try_lock_for(slack) else {
            if self.driver.is_disk_writer() {
                return ProcessOutcome::Retry;
            }
            tracing::debug!("engine lock unavailable within slack window, emitting silence");
            return ProcessOutcome::Ok;
        };
        let mut inner = guard.borrow_mut();

        if !matches!(inner.state, State::Ready | State::Playing | State::Testing) {
            return ProcessOutcome::Ok;
        }

        if self.driver.is_external_master() {
            if let Some(bpm) = self.driver.master_bpm() {
                inner.next_bpm = daw_transport::clamp_bpm(bpm);
            }
        }

        let sample_rate = self.driver.sample_rate();
        self.update_bpm_and_tick_size(&mut inner, sample_rate, Label::Audible);
        self.update_bpm_and_tick_size(&mut inner, sample_rate, Label::Queuing);

        if let Some(next) = inner.next_state.take() {
            if inner.state.can_transition_to(next) {
                inner.state = next;
                inner.events.push(Event::State(next));
            }
        }

        let is_playing = inner.state == State::Playing;
        inner.realtime_frame = if is_playing {
            inner.audible.frame
        } else {
            inner.realtime_frame + n_frames as i64
        };

        let mode = inner.mode;
        let use_metronome = self.config.use_metronome;
        let tempo_map = inner.tempo_map.clone();
        let is_playing_or_testing = matches!(inner.state, State::Playing | State::Testing);
        let realtime_frame = inner.realtime_frame;

        let Locked {
            ref audible,
            ref mut queuing,
            ref mut scheduler,
            ref mut note_queue,
            ref song,
            ref metronome,
            ref mut rng,
            ref mut events,
            ..
        } = *inner;

        let outcome = if let Some(song) = song {
            scheduler.update_note_queue(
                audible,
                queuing,
                n_frames as i64,
                realtime_frame,
                is_playing_or_testing,
                mode,
                song,
                &tempo_map,
                sample_rate,
                use_metronome,
                metronome,
                note_queue,
                events,
                rng,
            )
        } else {
            SchedulerOutcome::Continue
        };

        match outcome {
            SchedulerOutcome::EndOfSong => {
                // Mirrors the original calling `stop()` then `locate(0)`
                // synchronously in the same cycle: the state transition has
                // to land immediately (not through the `nextState` latch),
                // or the Playing-advance block below would still fire this
                // cycle and clobber the reset position it just set.
                if inner.state.can_transition_to(State::Ready) {
                    inner.state = State::Ready;
                    inner.events.push(Event::State(State::Ready));
                }
                inner.next_state = None;

                let resolution = inner.song.as_ref().map(|s| s.resolution).unwrap_or(48);
                for pos in [&mut inner.audible, &mut inner.queuing] {
                    pos.tick = 0.0;
                    if let Ok((frame, mismatch)) =
                        frame_for_tick(&tempo_map, sample_rate, resolution, 0.0)
                    {
                        pos.frame = frame;
                        pos.tick_mismatch = mismatch;
                    }
                }
                inner.events.push(Event::Relocation);
            }
            SchedulerOutcome::Inconsistent => {
                inner.events.push(Event::Error(-2));
            }
            SchedulerOutcome::Continue => {}
        }

        let current_frame = inner.audible.frame;
        let due = inner
            .note_queue
            .drain_due(current_frame + n_frames as i64);
        for note in due {
            let probability_gate = rand::Rng::gen::<f32>(&mut inner.rng);
            if probability_gate > note.probability {
                note.instrument.dequeue();
                continue;
            }
            note.instrument.dequeue();
            self.renderer.note_on(&note);
            inner.events.push(Event::NoteOn(note.instrument.id()));
        }

        if inner.state == State::Playing {
            inner.audible.frame += n_frames as i64;
            let resolution = inner.song.as_ref().map(|s| s.resolution).unwrap_or(48);
            inner.audible.tick =
                tick_for_frame(&tempo_map, sample_rate, resolution, inner.audible.frame)
                    .unwrap_or(inner.audible.tick);
            self.update_audible_column(&mut inner, mode, resolution);
        }

        let (out_l, out_r) = self.driver.output_buffers();
        self.renderer.process(n_frames, out_l, out_r);

        self.last_process_time = cycle_start.elapsed();
        if self.last_process_time > self.max_process_time {
            inner.events.push(Event::Xrun);
        }

        ProcessOutcome::Ok
    }
}
