//! End-to-end scenarios exercising the full `Engine::process` pipeline
//! against a `FakeDriver`/`NullRenderer` pair, corresponding to the seed
//! scenarios traced against `original_source` while building the scheduler
//! and engine (steady-state playback, tempo continuity, a song edit ahead
//! of the play head, end-of-song, the engine lock's timeout contract, and
//! metronome injection).

use std::time::Duration;

use daw_engine::{Engine, EngineConfig, Event, FakeDriver, NullRenderer, PlaybackMode, State};
use daw_transport::{InstrumentHandle, LoopMode, MidiNote, NoteTemplate, Pattern, PatternId, Song};

const SAMPLE_RATE: u32 = 48_000;
const BUFFER: u32 = 256;

fn config() -> EngineConfig {
    EngineConfig {
        buffer_size: BUFFER,
        ..Default::default()
    }
}

/// A single-column song whose pattern is `length_in_ticks` long, with a
/// quarter-note-ish hit every 4 ticks starting at 0.
fn song_with_quarter_notes(length_in_ticks: f64) -> Song {
    let mut song = Song::new(48);
    let mut pattern = Pattern::new(PatternId(0), length_in_ticks);
    let instrument = InstrumentHandle::new(1);
    let mut tick = 0.0;
    while tick < length_in_ticks {
        pattern.notes.push(NoteTemplate::new(instrument.clone(), tick));
        tick += 4.0;
    }
    song.patterns.insert(pattern);
    song.columns.push(vec![PatternId(0)]);
    song.loop_mode = LoopMode::Disabled;
    song
}

fn booted_engine(song: Song) -> (Engine, daw_engine::EventConsumer) {
    let driver = Box::new(FakeDriver::new(SAMPLE_RATE));
    let renderer = Box::new(NullRenderer::default());
    let (mut engine, events) = Engine::new(driver, renderer, config());
    engine.start_audio_drivers(BUFFER).unwrap();
    engine.set_song(song).unwrap();
    engine.set_mode(PlaybackMode::Song);
    (engine, events)
}

fn drain(events: &mut daw_engine::EventConsumer) -> Vec<Event> {
    let mut out = Vec::new();
    while let Some(e) = events.pop() {
        out.push(e);
    }
    out
}

/// S1: steady-state playback. Frame advances by exactly one buffer per
/// cycle and every note in the pattern eventually fires.
#[test]
fn steady_state_playback_advances_monotonically_and_fires_notes() {
    let (mut engine, mut events) = booted_engine(song_with_quarter_notes(64.0));
    engine.play();

    // tick_size at 120bpm/48 resolution/48kHz is 500 frames/tick, so 40
    // cycles of 256 frames (10240 frames = 20.48 ticks) should have fired
    // exactly the quarter notes at ticks 0, 4, 8, 12, 16 and 20.
    let mut note_on_count = 0;
    let mut last_frame = -1i64;
    for _ in 0..40 {
        engine.process(BUFFER as usize);
        let (_, frame, _) = engine.audible_position();
        assert!(frame > last_frame, "frame must strictly increase while playing");
        last_frame = frame;
        for event in drain(&mut events) {
            if let Event::NoteOn(_) = event {
                note_on_count += 1;
            }
        }
    }

    assert_eq!(note_on_count, 6, "every quarter note due within the processed window should have fired exactly once");
}

/// S2: a tempo change mid-playback is observed on the event queue, and the
/// transport resumes advancing by exactly one buffer's worth of frames per
/// cycle once the new tick size has settled (the one cycle where the bpm
/// change is detected is allowed to re-derive `frame` from the new tick
/// mapping — that's `frame_offset_tempo`'s job — but every cycle on either
/// side of it must be a plain `+= n_frames`).
#[test]
fn tempo_change_mid_playback_is_applied_and_settles_back_to_steady_advance() {
    let (mut engine, mut events) = booted_engine(song_with_quarter_notes(64.0));
    engine.play();

    let mut last_frame = -1i64;
    for _ in 0..5 {
        engine.process(BUFFER as usize);
        let (_, frame, _) = engine.audible_position();
        assert!(last_frame < 0 || frame - last_frame == BUFFER as i64);
        last_frame = frame;
    }

    engine.set_next_bpm(60.0);

    // The cycle where the new bpm is first picked up may re-derive `frame`
    // from the new tick size.
    engine.process(BUFFER as usize);
    let saw_tempo_changed = drain(&mut events).iter().any(|e| *e == Event::TempoChanged);
    assert!(saw_tempo_changed, "bpm change should be observable on the event queue");

    let (_, mut last_frame, _) = engine.audible_position();
    for _ in 0..5 {
        engine.process(BUFFER as usize);
        let (_, frame, _) = engine.audible_position();
        assert_eq!(frame - last_frame, BUFFER as i64, "frame advance must settle back to exactly one buffer");
        last_frame = frame;
    }
}

/// S3: lengthening a pattern ahead of the current column (a "song edit
/// inserting material before the current column") shifts the play head's
/// absolute tick by exactly the inserted length while holding its column
/// and within-column position steady.
#[test]
fn song_edit_before_current_column_preserves_position_within_column() {
    let mut old_song = Song::new(48);
    old_song.patterns.insert(Pattern::new(PatternId(0), 16.0));
    old_song.patterns.insert(Pattern::new(PatternId(1), 16.0));
    old_song.columns.push(vec![PatternId(0)]);
    old_song.columns.push(vec![PatternId(1)]);
    old_song.loop_mode = LoopMode::Enabled;

    let (mut engine, _events) = booted_engine(old_song.clone());
    engine.play();

    // Run until the audible head has crossed into column 1.
    for _ in 0..200 {
        engine.process(BUFFER as usize);
        if engine.audible_position().2 == 1 {
            break;
        }
    }
    let (tick_before, _, column_before) = engine.audible_position();
    assert_eq!(column_before, 1, "play head should have reached column 1");

    // Lengthen the first pattern by 16 ticks — material inserted ahead of
    // column 1 — without otherwise touching the song.
    let mut new_song = old_song;
    new_song.patterns.insert(Pattern::new(PatternId(0), 32.0));

    engine.update_song_size(new_song).unwrap();

    let (tick_after, _, column_after) = engine.audible_position();
    assert_eq!(column_after, 1, "column identity is preserved across the edit");
    assert!(
        (tick_after - tick_before - 16.0).abs() < 1e-6,
        "absolute tick should shift by exactly the inserted 16 ticks: before={tick_before} after={tick_after}"
    );
}

/// S4: reaching the end of a non-looping song stops playback and relocates
/// to the start.
#[test]
fn end_of_song_with_loop_disabled_stops_and_relocates() {
    let mut song = Song::new(48);
    song.patterns.insert(Pattern::new(PatternId(0), 8.0));
    song.columns.push(vec![PatternId(0)]);
    song.loop_mode = LoopMode::Disabled;

    let (mut engine, mut events) = booted_engine(song);
    engine.play();

    let mut saw_relocation = false;
    for _ in 0..10 {
        engine.process(BUFFER as usize);
        for event in drain(&mut events) {
            if event == Event::Relocation {
                saw_relocation = true;
            }
        }
        if saw_relocation {
            break;
        }
    }
    assert!(saw_relocation, "running past the end of a short song should relocate to 0");

    // The state transition lands synchronously in the same cycle as the
    // relocation (mirroring the original calling `stop()` then `locate(0)`
    // back to back), so both the frame and the state are already correct
    // without waiting for a further cycle.
    let (tick, frame, _) = engine.audible_position();
    assert_eq!(tick, 0.0, "tick should be reset to the start of the song");
    assert_eq!(frame, 0, "frame must be reset alongside tick, not left stale from before the relocation");
    assert_eq!(engine.state(), State::Ready);

    // Idempotent: running further cycles in the now-stopped engine doesn't
    // disturb the relocated position.
    engine.process(BUFFER as usize);
    assert_eq!(engine.state(), State::Ready);
}

/// S5: the engine lock's timeout contract (spec §5's `tryLockFor`), the
/// primitive `Engine::process` relies on to decide between silently
/// skipping a cycle and asking a disk-writer driver to retry. `Engine`
/// doesn't expose its internal lock, so this exercises the same
/// `parking_lot::ReentrantMutex<RefCell<_>>` shape directly.
#[test]
fn lock_timeout_contract_matches_engine_lock_shape() {
    use parking_lot::ReentrantMutex;
    use std::cell::RefCell;
    use std::sync::Arc;

    let lock = Arc::new(ReentrantMutex::new(RefCell::new(0u32)));
    let held = lock.lock();

    let contended = Arc::clone(&lock);
    let handle = std::thread::spawn(move || contended.try_lock_for(Duration::from_millis(20)).is_some());

    assert!(!handle.join().unwrap(), "a short timeout must fail while the lock is held elsewhere");
    drop(held);

    let handle = std::thread::spawn(move || lock.try_lock_for(Duration::from_millis(20)).is_some());
    assert!(handle.join().unwrap(), "lock should be acquirable once released");
}

/// S6: with the metronome enabled, the pattern downbeat both emits
/// `Event::Metronome(1)` and schedules an audible note.
#[test]
fn metronome_downbeat_fires_through_full_engine_pipeline() {
    let mut song = Song::new(48);
    song.patterns.insert(Pattern::new(PatternId(0), 64.0));
    song.columns.push(vec![PatternId(0)]);
    song.loop_mode = LoopMode::Enabled;

    let driver = Box::new(FakeDriver::new(SAMPLE_RATE));
    let renderer = Box::new(NullRenderer::default());
    let mut cfg = config();
    cfg.use_metronome = true;
    let (mut engine, mut events) = Engine::new(driver, renderer, cfg);
    engine.start_audio_drivers(BUFFER).unwrap();
    engine.set_song(song).unwrap();
    engine.set_mode(PlaybackMode::Song);
    engine.play();

    let mut saw_downbeat = false;
    let mut saw_note_on = false;
    for _ in 0..5 {
        engine.process(BUFFER as usize);
        for event in drain(&mut events) {
            match event {
                Event::Metronome(1) => saw_downbeat = true,
                Event::NoteOn(_) => saw_note_on = true,
                _ => {}
            }
        }
    }

    assert!(saw_downbeat, "pattern downbeat should emit Event::Metronome(1)");
    assert!(saw_note_on, "metronome click should be audible when use_metronome is set");
}

/// A note pushed through `Engine::push_midi` — the realtime MIDI/keyboard
/// input path — is drained by the scheduler's MIDI FIFO and reaches the
/// renderer, the same as a pattern-sourced note.
#[test]
fn push_midi_reaches_renderer_through_full_engine_pipeline() {
    let (mut engine, mut events) = booted_engine(song_with_quarter_notes(64.0));
    engine.play();

    engine.push_midi(MidiNote {
        instrument: InstrumentHandle::new(7),
        position: 2.0,
        velocity: 1.0,
        pan: 0.0,
        length: None,
        pitch: 0.0,
        note_off: false,
    });

    let mut saw_note_on = false;
    for _ in 0..10 {
        engine.process(BUFFER as usize);
        for event in drain(&mut events) {
            if let Event::NoteOn(id) = event {
                if id == 7 {
                    saw_note_on = true;
                }
            }
        }
    }

    assert!(saw_note_on, "a note pushed via push_midi should reach the renderer through the realtime pipeline");
}
