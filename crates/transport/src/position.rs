//! [`TransportPosition`]: the central value object (spec §3/§4.2). Two
//! instances exist process-wide — audible and queuing — both built from
//! this same type, distinguished only by `label`.

use std::collections::BTreeSet;

use crate::song::PatternId;
use crate::tick_clock::compute_tick_size;

/// Which of the two process-wide positions this value represents. Carried
/// only for diagnostics (log lines, Debug output) — never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Audible,
    Queuing,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Audible => "Transport",
            Label::Queuing => "Queuing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportPosition {
    pub label: Label,
    pub frame: i64,
    pub tick: f64,
    pub tick_mismatch: f64,
    pub bpm: f64,
    pub tick_size: f64,
    /// Index into the song's column vector; `-1` once past the end of the
    /// song (spec §4.4b).
    pub column: i32,
    pub pattern_start_tick: f64,
    pub pattern_tick_position: f64,
    pub pattern_size: f64,
    pub playing_patterns: BTreeSet<PatternId>,
    pub next_patterns: BTreeSet<PatternId>,
    pub frame_offset_tempo: f64,
    pub tick_offset_queuing: f64,
    pub tick_offset_song_size: f64,
}

impl TransportPosition {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            frame: 0,
            tick: 0.0,
            tick_mismatch: 0.0,
            bpm: 120.0,
            tick_size: 0.0,
            column: 0,
            pattern_start_tick: 0.0,
            pattern_tick_position: 0.0,
            pattern_size: 0.0,
            playing_patterns: BTreeSet::new(),
            next_patterns: BTreeSet::new(),
            frame_offset_tempo: 0.0,
            tick_offset_queuing: 0.0,
            tick_offset_song_size: 0.0,
        }
    }

    /// Reset to the session start, keeping `bpm`/`tick_size` and `label`.
    pub fn reset(&mut self) {
        let label = self.label;
        let bpm = self.bpm;
        let tick_size = self.tick_size;
        *self = Self::new(label);
        self.bpm = bpm;
        self.tick_size = tick_size;
    }

    /// Deep-copy every field from `other` except `label` (spec §4.2).
    pub fn set(&mut self, other: &TransportPosition) {
        let label = self.label;
        *self = other.clone();
        self.label = label;
    }

    /// Re-derive `tick_size` from `bpm`, and `pattern_tick_position` /
    /// `pattern_size` from `tick` / `pattern_start_tick` / the lengths of
    /// the currently playing patterns (spec §4.2). `max_notes` is the
    /// fallback pattern size used when nothing is playing.
    pub fn recompute(
        &mut self,
        sample_rate: u32,
        resolution: u32,
        pattern_lengths: impl IntoIterator<Item = f64>,
        max_notes: f64,
    ) -> Result<(), crate::error::Error> {
        self.tick_size = compute_tick_size(sample_rate, self.bpm, resolution)?;

        self.pattern_size = pattern_lengths
            .into_iter()
            .fold(0.0_f64, f64::max);
        if self.pattern_size <= 0.0 {
            self.pattern_size = max_notes;
        }

        let raw = self.tick - self.pattern_start_tick;
        self.pattern_tick_position = if self.pattern_size > 0.0 {
            raw.rem_euclid(self.pattern_size)
        } else {
            raw
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_wraps_pattern_tick_position_into_bounds() {
        let mut pos = TransportPosition::new(Label::Audible);
        pos.bpm = 120.0;
        pos.tick = 205.0;
        pos.pattern_start_tick = 192.0;
        pos.recompute(48_000, 48, [192.0], 192.0).unwrap();
        assert_eq!(pos.pattern_size, 192.0);
        assert!((pos.pattern_tick_position - 13.0).abs() < 1e-9);
        assert!(pos.pattern_tick_position >= 0.0 && pos.pattern_tick_position < pos.pattern_size);
    }

    #[test]
    fn recompute_falls_back_to_max_notes_when_nothing_playing() {
        let mut pos = TransportPosition::new(Label::Queuing);
        pos.bpm = 120.0;
        pos.tick = 10.0;
        pos.recompute(48_000, 48, std::iter::empty(), 192.0).unwrap();
        assert_eq!(pos.pattern_size, 192.0);
    }

    #[test]
    fn set_copies_every_field_but_label() {
        let mut a = TransportPosition::new(Label::Audible);
        let mut b = TransportPosition::new(Label::Queuing);
        b.frame = 42;
        b.tick = 7.5;
        a.set(&b);
        assert_eq!(a.label, Label::Audible);
        assert_eq!(a.frame, 42);
        assert_eq!(a.tick, 7.5);
    }
}
