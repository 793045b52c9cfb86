//! The minimal song/pattern model the transport/scheduler core needs to
//! exist (spec §4.4/§4.5.4). Grounded in `original_source`'s
//! `Song`/`Pattern`/`PatternList`/`Timeline` classes, reduced to the fields
//! the scheduler actually reads. A full pattern-editor data model remains
//! out of scope (spec §1).

use std::collections::BTreeMap;

use crate::note::NoteTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatternId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: PatternId,
    pub length_in_ticks: f64,
    pub notes: Vec<NoteTemplate>,
}

impl Pattern {
    pub fn new(id: PatternId, length_in_ticks: f64) -> Self {
        Self {
            id,
            length_in_ticks,
            notes: Vec::new(),
        }
    }

    /// Notes at exactly the given pattern-local tick (spec §4.4d iterates
    /// "all notes at tick `queuing.patternTickPosition`").
    pub fn notes_at(&self, tick: f64) -> impl Iterator<Item = &NoteTemplate> {
        self.notes.iter().filter(move |n| n.position == tick)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: BTreeMap<PatternId, Pattern>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: Pattern) {
        self.patterns.insert(pattern.id, pattern);
    }

    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Whether transport wraps back to column 0 at the end of the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Disabled,
    Enabled,
    /// Looping is being turned off mid-playback: finish the current pass
    /// but stop at the next wrap (spec §4.4b).
    Finishing,
}

/// One column of the song: the set of patterns stacked together there.
pub type Column = Vec<PatternId>;

/// A tempo-marker timeline position indexed by column (spec §4.5.3's
/// "Timeline tempo marker at P.column").
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub enabled: bool,
    /// `(column, bpm)`, sorted ascending by column.
    pub markers: Vec<(usize, f64)>,
}

impl Timeline {
    pub fn bpm_at_column(&self, column: i32) -> Option<f64> {
        if !self.enabled || column < 0 {
            return None;
        }
        let column = column as usize;
        self.markers
            .iter()
            .rev()
            .find(|(c, _)| *c <= column)
            .map(|(_, bpm)| *bpm)
    }
}

/// Velocity-automation envelope sampled at `column + (position mod 192)/192`
/// (spec §4.4d). A full automation-curve editor is out of scope (spec §1);
/// this is just the piecewise-linear curve the scheduler reads.
#[derive(Debug, Clone, Default)]
pub struct AutomationPath {
    /// `(x, y)` pairs, sorted ascending by `x`. Empty means "no automation",
    /// i.e. a constant multiplier of 1.0.
    pub points: Vec<(f64, f64)>,
}

impl AutomationPath {
    pub fn get_value(&self, x: f64) -> f32 {
        if self.points.is_empty() {
            return 1.0;
        }
        if x <= self.points[0].0 {
            return self.points[0].1 as f32;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if x <= x1 {
                if x1 == x0 {
                    return y1 as f32;
                }
                let t = (x - x0) / (x1 - x0);
                return (y0 + t * (y1 - y0)) as f32;
            }
        }
        self.points.last().unwrap().1 as f32
    }
}

#[derive(Debug, Clone)]
pub struct Song {
    pub columns: Vec<Column>,
    pub patterns: PatternStore,
    pub resolution: u32,
    pub swing_factor: f32,
    pub humanize_time_value: f32,
    pub humanize_velocity_value: f32,
    pub loop_mode: LoopMode,
    pub timeline: Timeline,
    pub velocity_automation_path: AutomationPath,
}

impl Song {
    pub fn new(resolution: u32) -> Self {
        Self {
            columns: Vec::new(),
            patterns: PatternStore::new(),
            resolution,
            swing_factor: 0.0,
            humanize_time_value: 0.0,
            humanize_velocity_value: 0.0,
            loop_mode: LoopMode::Disabled,
            timeline: Timeline::default(),
            velocity_automation_path: AutomationPath::default(),
        }
    }

    /// Total length of the song (sum of the longest pattern at each column),
    /// in ticks.
    pub fn size_in_ticks(&self) -> f64 {
        self.columns
            .iter()
            .map(|col| self.column_length(col))
            .sum()
    }

    fn column_length(&self, column: &Column) -> f64 {
        column
            .iter()
            .filter_map(|id| self.patterns.get(*id))
            .map(|p| p.length_in_ticks)
            .fold(0.0, f64::max)
    }

    /// `tickForColumn`: the starting tick of `column` and, via the return
    /// value, which column a given tick falls in (spec §4.5.4/I4).
    pub fn tick_for_column(&self, column: usize) -> f64 {
        self.columns
            .iter()
            .take(column)
            .map(|col| self.column_length(col))
            .sum()
    }

    /// `getColumnForTick`: returns `(column, pattern_start_tick)`, or `None`
    /// (mapped to `column == -1` by the caller) once `tick` runs past the
    /// end of the song and looping is disabled.
    pub fn column_for_tick(&self, tick: f64) -> Option<(usize, f64)> {
        let mut start = 0.0;
        for (i, col) in self.columns.iter().enumerate() {
            let len = self.column_length(col);
            if tick < start + len || (len == 0.0 && tick == start) {
                return Some((i, start));
            }
            start += len;
        }
        None
    }

    pub fn playing_patterns_at_column(&self, column: usize) -> Vec<PatternId> {
        self.columns.get(column).cloned().unwrap_or_default()
    }

    /// Longest of the stacked patterns at `column`, used for `patternSize`
    /// (spec §3). Falls back to `MAX_NOTES` if the column is empty.
    pub fn pattern_size_at_column(&self, column: usize, max_notes: f64) -> f64 {
        let len = self.column_length(self.columns.get(column).unwrap_or(&Vec::new()));
        if len == 0.0 { max_notes } else { len }
    }

    /// §9 open question: "when a pattern list exists at the current column,
    /// pick the maximum pattern index" (resolves the null-pointer-adjacent
    /// bug in the original `handleSelectedPattern`).
    pub fn selected_pattern_at_column(&self, column: usize) -> Option<PatternId> {
        self.columns.get(column).and_then(|col| col.iter().copied().max())
    }
}
