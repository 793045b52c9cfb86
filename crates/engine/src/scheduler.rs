//! `Scheduler::update_note_queue`: the tick-window/lookahead computation and
//! per-tick note materialization loop (spec §4.4). Grounded in
//! `original_source`'s `AudioEngine::computeTickInterval` (the lead-lag
//! caching and lookahead arithmetic) and `AudioEngine::updateNoteQueue` (the
//! MIDI drain, song/pattern position advance, metronome injection and
//! swing/humanize/lead-lag note offset computation).

use std::collections::BTreeSet;

use daw_transport::{
    InstrumentHandle, LEAD_LAG_TICKS, LoopMode, MAX_HUMANIZE_FRAMES, MAX_NOTES,
    METRONOME_TICK_MODULUS, NoteQueue, NoteTemplate, ScheduledNote, Song, TempoMap,
    TransportPosition, frame_for_tick, tick_for_frame,
};
use rand::Rng;

use crate::event::{Event, EventProducer};
use crate::humanize::gaussian;

/// Song mode walks `Song::columns`; pattern mode loops the currently
/// selected pattern(s) in place (spec §1/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Song,
    Pattern,
}

/// Replaces the raw `{0, -1, -2}` return convention of the distilled
/// algorithm (spec §4.4): `EndOfSong` triggers `stop(); locate(0)` in
/// `Engine::process`, `Inconsistent` surfaces as an `Event::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerOutcome {
    Continue,
    EndOfSong,
    Inconsistent,
}

#[derive(Debug)]
pub struct Scheduler {
    last_lead_lag_factor: Option<i64>,
    lookahead_applied: bool,
    last_tick_end: f64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_lead_lag_factor: None,
            lookahead_applied: false,
            last_tick_end: 0.0,
        }
    }

    /// Called by `Engine::update_bpm_and_tick_size` whenever tick size
    /// changes (spec §4.4 tie-break: the cached factor is kept until the
    /// change is acknowledged, then dropped, to avoid ±1-frame jitter).
    pub fn invalidate_lead_lag_factor(&mut self) {
        self.last_lead_lag_factor = None;
    }

    pub fn last_tick_end(&self) -> f64 {
        self.last_tick_end
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_note_queue(
        &mut self,
        audible: &TransportPosition,
        queuing: &mut TransportPosition,
        n_interval_length_in_frames: i64,
        realtime_frame: i64,
        is_playing_or_testing: bool,
        mode: PlaybackMode,
        song: &Song,
        tempo_map: &TempoMap,
        sample_rate: u32,
        use_metronome: bool,
        metronome_instrument: &InstrumentHandle,
        note_queue: &mut NoteQueue,
        events: &mut EventProducer,
        rng: &mut impl Rng,
    ) -> SchedulerOutcome {
        let resolution = song.resolution;

        macro_rules! frame_of {
            ($tick:expr) => {
                match frame_for_tick(tempo_map, sample_rate, resolution, $tick) {
                    Ok(v) => v,
                    Err(_) => return SchedulerOutcome::Inconsistent,
                }
            };
        }

        // --- 1. Compute the tick window ------------------------------------
        let frame_start_base = if is_playing_or_testing {
            audible.frame
        } else {
            realtime_frame
        };

        let lead_lag_frames = match self.last_lead_lag_factor {
            Some(factor) => factor,
            None => {
                let (base, _) = frame_of!(queuing.tick);
                let (lead, _) = frame_of!(queuing.tick + LEAD_LAG_TICKS);
                let factor = lead - base;
                self.last_lead_lag_factor = Some(factor);
                factor
            }
        };

        let lookahead = lead_lag_frames + MAX_HUMANIZE_FRAMES + 1;
        let frame_start = if self.lookahead_applied {
            frame_start_base + lookahead
        } else {
            frame_start_base
        };
        let frame_end = frame_start + lookahead + n_interval_length_in_frames;

        let tick_start = match tick_for_frame(tempo_map, sample_rate, resolution, frame_start) {
            Ok(t) => t - queuing.tick_offset_queuing,
            Err(_) => return SchedulerOutcome::Inconsistent,
        };
        let tick_end = match tick_for_frame(tempo_map, sample_rate, resolution, frame_end) {
            Ok(t) => t - queuing.tick_offset_queuing,
            Err(_) => return SchedulerOutcome::Inconsistent,
        };

        // --- 2. Drain the MIDI FIFO -----------------------------------------
        while let Some(midi) = note_queue.pop_midi_due(tick_end) {
            let (frame, mismatch) = frame_of!(midi.position);
            queuing.tick_mismatch = mismatch;
            midi.instrument.enqueue();
            note_queue.push_scheduled(ScheduledNote::from_midi(&midi, frame));
        }

        // --- 3. Not playing: window/lookahead bookkeeping only --------------
        if !is_playing_or_testing {
            self.lookahead_applied = true;
            self.last_tick_end = tick_end;
            return SchedulerOutcome::Continue;
        }

        // --- 4. Per-tick loop -------------------------------------------------
        let start_n = tick_start.floor() as i64;
        let end_n = tick_end.floor() as i64;
        for n in start_n..end_n {
            let n_tick = n as f64;

            match mode {
                PlaybackMode::Song => {
                    let Some((column, pattern_start_tick)) = song.column_for_tick(n_tick) else {
                        queuing.column = -1;
                        return SchedulerOutcome::EndOfSong;
                    };
                    queuing.column = column as i32;
                    queuing.pattern_start_tick = pattern_start_tick;
                    let ids: BTreeSet<_> = song.playing_patterns_at_column(column).into_iter().collect();
                    queuing.playing_patterns = ids;
                    let pattern_size = song.pattern_size_at_column(column, MAX_NOTES);
                    queuing.tick = n_tick;
                    if queuing
                        .recompute(sample_rate, resolution, [pattern_size], MAX_NOTES)
                        .is_err()
                    {
                        return SchedulerOutcome::Inconsistent;
                    }

                    let wrapped_before_audible = song.loop_mode == LoopMode::Finishing
                        && audible.column > 0
                        && queuing.column < audible.column;
                    if wrapped_before_audible {
                        return SchedulerOutcome::EndOfSong;
                    }
                }
                PlaybackMode::Pattern => {
                    queuing.tick = n_tick;
                    let pattern_size = if queuing.pattern_size > 0.0 {
                        queuing.pattern_size
                    } else {
                        MAX_NOTES
                    };
                    queuing.pattern_size = pattern_size;
                    queuing.pattern_tick_position =
                        (n_tick - queuing.pattern_start_tick).rem_euclid(pattern_size);
                }
            }

            let (tick_frame, tick_mismatch) = frame_of!(n_tick);
            queuing.frame = tick_frame;
            queuing.tick_mismatch = tick_mismatch;

            // --- metronome injection ---------------------------------------
            if queuing.pattern_tick_position % METRONOME_TICK_MODULUS == 0.0 {
                let downbeat = queuing.pattern_tick_position == 0.0;
                let (pitch, velocity) = if downbeat { (3.0, 1.0) } else { (0.0, 0.8) };
                events.push(Event::Metronome(if downbeat { 1 } else { 0 }));
                if use_metronome {
                    metronome_instrument.enqueue();
                    let mut template = NoteTemplate::new(metronome_instrument.clone(), n_tick);
                    template.pitch = pitch;
                    template.velocity = velocity;
                    note_queue.push_scheduled(ScheduledNote::from_template(
                        &template, n_tick, 0, tick_frame,
                    ));
                }
            }

            // --- pattern note materialization -------------------------------
            if !queuing.playing_patterns.is_empty() {
                let playing = queuing.playing_patterns.clone();
                for pattern_id in playing {
                    let Some(pattern) = song.patterns.get(pattern_id) else {
                        continue;
                    };
                    for template in pattern.notes_at(queuing.pattern_tick_position) {
                        let mut offset = 0i64;

                        let is_upbeat_16th = (queuing.pattern_tick_position % (MAX_NOTES / 16.0)
                            == 0.0)
                            && (queuing.pattern_tick_position % (MAX_NOTES / 8.0) != 0.0);
                        if is_upbeat_16th && song.swing_factor > 0.0 {
                            let (swung, _) = frame_of!(n_tick + MAX_NOTES / 32.0);
                            offset +=
                                (swung as f64 * song.swing_factor as f64).round() as i64 - tick_frame;
                        }

                        if song.humanize_time_value != 0.0 {
                            offset += (gaussian(rng, 0.3)
                                * song.humanize_time_value as f64
                                * MAX_HUMANIZE_FRAMES as f64) as i64;
                        }

                        offset += (template.lead_lag as f64 * lead_lag_frames as f64) as i64;

                        if queuing.frame + offset < 0 {
                            offset = -queuing.frame;
                        }
                        offset = offset.clamp(-MAX_HUMANIZE_FRAMES, MAX_HUMANIZE_FRAMES);

                        let note_start = tick_frame + offset;
                        let mut scheduled =
                            ScheduledNote::from_template(template, n_tick, offset, note_start);

                        if mode == PlaybackMode::Song {
                            let automation_x =
                                queuing.column as f64 + (n_tick.rem_euclid(192.0)) / 192.0;
                            scheduled.velocity *= song.velocity_automation_path.get_value(automation_x);
                        }

                        if song.humanize_velocity_value != 0.0 {
                            let delta = song.humanize_velocity_value as f64 * gaussian(rng, 0.2)
                                - song.humanize_velocity_value as f64 / 2.0;
                            scheduled.velocity = (scheduled.velocity as f64 + delta).clamp(0.0, 1.0) as f32;
                        }

                        if template.instrument.random_pitch_factor != 0.0 {
                            scheduled.pitch +=
                                (gaussian(rng, 0.4) * template.instrument.random_pitch_factor as f64) as f32;
                        }
                        scheduled.pitch += template.instrument.pitch_offset;

                        template.instrument.enqueue();
                        note_queue.push_scheduled(scheduled);
                    }
                }
            }
        }

        self.lookahead_applied = true;
        self.last_tick_end = tick_end;
        SchedulerOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daw_transport::{Label, Pattern, PatternId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn constant_120_bpm() -> TempoMap {
        TempoMap::Constant(120.0)
    }

    fn fresh_positions() -> (TransportPosition, TransportPosition) {
        let mut audible = TransportPosition::new(Label::Audible);
        let mut queuing = TransportPosition::new(Label::Queuing);
        audible.bpm = 120.0;
        queuing.bpm = 120.0;
        (audible, queuing)
    }

    #[test]
    fn pattern_mode_materializes_a_note_at_its_tick() {
        let mut song = Song::new(48);
        let mut pattern = Pattern::new(PatternId(0), MAX_NOTES);
        let instrument = InstrumentHandle::new(1);
        pattern.notes.push(NoteTemplate::new(instrument, 0.0));
        song.patterns.insert(pattern);
        song.columns.push(vec![PatternId(0)]);

        let (audible, mut queuing) = fresh_positions();
        queuing.playing_patterns = [PatternId(0)].into_iter().collect();
        queuing.pattern_size = MAX_NOTES;

        let mut scheduler = Scheduler::new();
        let mut note_queue = NoteQueue::new();
        let (mut events, _rx) = crate::event::event_channel(16);
        let metronome = InstrumentHandle::metronome();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = scheduler.update_note_queue(
            &audible,
            &mut queuing,
            1024,
            0,
            true,
            PlaybackMode::Pattern,
            &song,
            &constant_120_bpm(),
            48_000,
            false,
            &metronome,
            &mut note_queue,
            &mut events,
            &mut rng,
        );

        assert_eq!(outcome, SchedulerOutcome::Continue);
        assert!(note_queue.len_scheduled() >= 1);
    }

    #[test]
    fn song_mode_reports_end_of_song_past_the_last_column() {
        let mut song = Song::new(48);
        let pattern = Pattern::new(PatternId(0), MAX_NOTES);
        song.patterns.insert(pattern);
        song.columns.push(vec![PatternId(0)]);

        let (audible, mut queuing) = fresh_positions();
        queuing.pattern_size = MAX_NOTES;

        let mut scheduler = Scheduler::new();
        let mut note_queue = NoteQueue::new();
        let (mut events, _rx) = crate::event::event_channel(16);
        let metronome = InstrumentHandle::metronome();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = scheduler.update_note_queue(
            &audible,
            &mut queuing,
            100_000,
            0,
            true,
            PlaybackMode::Song,
            &song,
            &constant_120_bpm(),
            48_000,
            false,
            &metronome,
            &mut note_queue,
            &mut events,
            &mut rng,
        );

        assert_eq!(outcome, SchedulerOutcome::EndOfSong);
        assert_eq!(queuing.column, -1);
    }

    #[test]
    fn metronome_downbeat_emits_high_pitch_when_enabled() {
        let mut song = Song::new(48);
        song.patterns.insert(Pattern::new(PatternId(0), MAX_NOTES));
        song.columns.push(vec![PatternId(0)]);

        let (audible, mut queuing) = fresh_positions();
        queuing.playing_patterns = [PatternId(0)].into_iter().collect();
        queuing.pattern_size = MAX_NOTES;

        let mut scheduler = Scheduler::new();
        let mut note_queue = NoteQueue::new();
        let (mut events, _rx) = crate::event::event_channel(16);
        let metronome = InstrumentHandle::metronome();
        let mut rng = StdRng::seed_from_u64(1);

        scheduler.update_note_queue(
            &audible,
            &mut queuing,
            1024,
            0,
            true,
            PlaybackMode::Pattern,
            &song,
            &constant_120_bpm(),
            48_000,
            true,
            &metronome,
            &mut note_queue,
            &mut events,
            &mut rng,
        );

        let metronome_note = note_queue
            .peek_scheduled()
            .expect("metronome note should be scheduled");
        assert_eq!(metronome_note.pitch, 3.0);
        assert_eq!(metronome_note.velocity, 1.0);
    }

    #[test]
    fn not_playing_still_drains_midi_fifo_but_schedules_nothing_else() {
        let song = Song::new(48);
        let (audible, mut queuing) = fresh_positions();
        let mut scheduler = Scheduler::new();
        let mut note_queue = NoteQueue::new();
        let instrument = InstrumentHandle::new(5);
        note_queue.push_midi(daw_transport::MidiNote {
            instrument: instrument.clone(),
            position: 0.0,
            velocity: 1.0,
            pan: 0.0,
            length: None,
            pitch: 0.0,
            note_off: false,
        });
        let (mut events, _rx) = crate::event::event_channel(16);
        let metronome = InstrumentHandle::metronome();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = scheduler.update_note_queue(
            &audible,
            &mut queuing,
            1024,
            0,
            false,
            PlaybackMode::Pattern,
            &song,
            &constant_120_bpm(),
            48_000,
            false,
            &metronome,
            &mut note_queue,
            &mut events,
            &mut rng,
        );

        assert_eq!(outcome, SchedulerOutcome::Continue);
        assert_eq!(note_queue.len_scheduled(), 1);
    }
}
