//! The lock-free MPSC event queue the engine publishes to (spec §6). Built
//! on `rtrb`, the same ring-buffer the teacher already uses for its
//! command/status channels, so the audio thread never blocks publishing.

use crate::state::State;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    State(State),
    TempoChanged,
    SongSizeChanged,
    PlayingPatternsChanged,
    /// 1 if this tick is the pattern downbeat, else 0 (spec §4.4c).
    Metronome(u32),
    /// Instrument id that just sounded.
    NoteOn(u32),
    Xrun,
    Relocation,
    DriverChanged,
    Error(i32),
    MidiActivity,
}

/// Producer half, owned by the `Engine` and handed to the audio thread.
pub struct EventProducer {
    inner: rtrb::Producer<Event>,
    dropped: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl EventProducer {
    /// Never blocks: a full queue silently drops the event and bumps the
    /// dropped-event counter, rather than stalling the realtime thread.
    pub fn push(&mut self, event: Event) {
        if self.inner.push(event).is_err() {
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::debug!("event queue full, dropping event");
        }
    }
}

/// Consumer half, polled from a control thread (GUI, OSC, ...).
pub struct EventConsumer {
    inner: rtrb::Consumer<Event>,
    dropped: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl EventConsumer {
    pub fn pop(&mut self) -> Option<Event> {
        self.inner.pop().ok()
    }

    /// Number of events dropped because the queue was full when pushed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Create a bounded event channel. `capacity` should comfortably exceed the
/// number of events a single `process` call can emit.
pub fn event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let (tx, rx) = rtrb::RingBuffer::new(capacity);
    let dropped = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
    (
        EventProducer {
            inner: tx,
            dropped: dropped.clone(),
        },
        EventConsumer { inner: rx, dropped },
    )
}
