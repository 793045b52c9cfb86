//! Pure tick↔frame conversion. No locks, no I/O, no global state — every
//! function here is a value-in, value-out transform so it can be exercised
//! (and proven bijective) without spinning up an [`Engine`](../daw_engine).

use crate::error::Error;

/// Lower bound a bpm may take once clamped (spec §8 boundary behavior).
pub const MIN_BPM: f64 = 1.0;
/// Upper bound a bpm may take once clamped (spec §8 boundary behavior).
pub const MAX_BPM: f64 = 400.0;

/// `frames_per_tick = sample_rate * 60 / bpm / resolution`.
///
/// Fails with [`Error::InvalidTempo`] if `bpm <= 0` or `resolution == 0`.
pub fn compute_tick_size(sample_rate: u32, bpm: f64, resolution: u32) -> Result<f64, Error> {
    if bpm <= 0.0 || resolution == 0 {
        return Err(Error::InvalidTempo { bpm, resolution });
    }
    Ok(sample_rate as f64 * 60.0 / bpm / resolution as f64)
}

/// Clamp a user- or driver-supplied bpm into `[MIN_BPM, MAX_BPM]`.
pub fn clamp_bpm(bpm: f64) -> f64 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// One constant-tempo stretch of the timeline, starting at `start_tick` and
/// running up to (but not including) the next marker's `start_tick`, or to
/// infinity for the last marker. Mirrors Hydrogen's per-column tempo marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoMarker {
    pub start_tick: f64,
    pub bpm: f64,
}

/// The tempo map a [`TickClock`] integrates over. `Constant` is used outside
/// song mode (or when the timeline is disabled); `Timeline` is a sorted,
/// non-empty list of markers with the first one always at `start_tick == 0`.
#[derive(Debug, Clone)]
pub enum TempoMap {
    Constant(f64),
    Timeline(Vec<TempoMarker>),
}

impl TempoMap {
    fn segments(&self) -> Vec<TempoMarker> {
        match self {
            TempoMap::Constant(bpm) => vec![TempoMarker {
                start_tick: 0.0,
                bpm: *bpm,
            }],
            TempoMap::Timeline(markers) => markers.clone(),
        }
    }

    /// The bpm in effect at `tick` (the marker with the greatest
    /// `start_tick <= tick`).
    pub fn bpm_at_tick(&self, tick: f64) -> f64 {
        let segments = self.segments();
        segments
            .iter()
            .rev()
            .find(|m| m.start_tick <= tick)
            .map(|m| m.bpm)
            .unwrap_or(segments[0].bpm)
    }
}

/// `frame_for_tick(tick)` integrated from tick 0, returning the exact frame
/// plus the tick-domain residual (`tick_mismatch`) needed so that
/// `tick_for_frame(frame) + tick_mismatch == tick` exactly (spec §4.1/I2).
pub fn frame_for_tick(
    tempo_map: &TempoMap,
    sample_rate: u32,
    resolution: u32,
    tick: f64,
) -> Result<(i64, f64), Error> {
    if tick < 0.0 {
        return Err(Error::InvalidTick { tick });
    }

    let segments = tempo_map.segments();
    let mut frame_accum = 0.0f64;
    let mut current_tick_size = compute_tick_size(sample_rate, segments[0].bpm, resolution)?;

    for (i, marker) in segments.iter().enumerate() {
        let segment_end = segments
            .get(i + 1)
            .map(|next| next.start_tick)
            .unwrap_or(f64::INFINITY);
        current_tick_size = compute_tick_size(sample_rate, marker.bpm, resolution)?;

        if tick <= segment_end {
            frame_accum += (tick - marker.start_tick) * current_tick_size;
            break;
        }
        frame_accum += (segment_end - marker.start_tick) * current_tick_size;
    }

    let frame = frame_accum.round();
    let mismatch_frames = frame_accum - frame;
    let tick_mismatch = if current_tick_size != 0.0 {
        mismatch_frames / current_tick_size
    } else {
        0.0
    };
    Ok((frame as i64, tick_mismatch))
}

/// Inverse of [`frame_for_tick`]: integrate the tempo map in frame-space and
/// return the tick that `frame` corresponds to.
pub fn tick_for_frame(
    tempo_map: &TempoMap,
    sample_rate: u32,
    resolution: u32,
    frame: i64,
) -> Result<f64, Error> {
    let segments = tempo_map.segments();
    let frame = frame as f64;

    let mut frame_accum = 0.0f64;
    for (i, marker) in segments.iter().enumerate() {
        let segment_end_tick = segments
            .get(i + 1)
            .map(|next| next.start_tick)
            .unwrap_or(f64::INFINITY);
        let tick_size = compute_tick_size(sample_rate, marker.bpm, resolution)?;
        let segment_frames = if segment_end_tick.is_finite() {
            (segment_end_tick - marker.start_tick) * tick_size
        } else {
            f64::INFINITY
        };

        if frame <= frame_accum + segment_frames {
            let frame_into_segment = frame - frame_accum;
            return Ok(marker.start_tick + frame_into_segment / tick_size);
        }
        frame_accum += segment_frames;
    }

    // Unreachable for a well-formed tempo map: the last segment is unbounded.
    Err(Error::InvalidTick { tick: frame })
}

/// `computeTickFromFrame` rounding rule from spec §4.4: when relocating
/// (e.g. an external-clock jump), a fractional part `>= 0.97` is rounded up
/// to avoid an off-by-one glitch landing one tick early.
pub fn round_tick_for_relocation(tick: f64) -> f64 {
    let floor = tick.floor();
    let frac = tick - floor;
    if frac >= 0.97 { floor + 1.0 } else { tick }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_tick_size_matches_formula() {
        let ts = compute_tick_size(48_000, 120.0, 48).unwrap();
        assert!((ts - 48_000.0 * 60.0 / 120.0 / 48.0).abs() < 1e-9);
    }

    #[test]
    fn compute_tick_size_rejects_nonpositive_bpm() {
        assert!(compute_tick_size(48_000, 0.0, 48).is_err());
        assert!(compute_tick_size(48_000, -10.0, 48).is_err());
    }

    #[test]
    fn compute_tick_size_rejects_zero_resolution() {
        assert!(compute_tick_size(48_000, 120.0, 0).is_err());
    }

    #[test]
    fn roundtrip_is_exact_modulo_mismatch_for_constant_tempo() {
        let map = TempoMap::Constant(120.0);
        for t in [0.0, 0.5, 1.0, 4.25, 1000.3] {
            let (frame, mismatch) = frame_for_tick(&map, 48_000, 48, t).unwrap();
            let back = tick_for_frame(&map, 48_000, 48, frame).unwrap();
            assert!((back + mismatch - t).abs() < 1e-6, "t={t} back={back} mismatch={mismatch}");
        }
    }

    #[test]
    fn integer_ticks_convert_to_exact_frames_s1() {
        // S1: resolution=48, bpm=120, sampleRate=48000 -> tick 0.5 should be 480 frames.
        let map = TempoMap::Constant(120.0);
        let (frame, _) = frame_for_tick(&map, 48_000, 48, 0.5).unwrap();
        assert_eq!(frame, 480);
    }

    #[test]
    fn tempo_change_mid_timeline_is_continuous() {
        let map = TempoMap::Timeline(vec![
            TempoMarker { start_tick: 0.0, bpm: 120.0 },
            TempoMarker { start_tick: 48.0, bpm: 60.0 },
        ]);
        // Up to tick 48 at 120bpm: 48 * (48000*60/120/48) = 48000 frames.
        let (frame_at_marker, _) = frame_for_tick(&map, 48_000, 48, 48.0).unwrap();
        assert_eq!(frame_at_marker, 48_000);

        let (frame_past, _) = frame_for_tick(&map, 48_000, 48, 58.0).unwrap();
        // 10 more ticks at 60bpm tick size = 96000/48 = doubled.
        let tick_size_60 = compute_tick_size(48_000, 60.0, 48).unwrap();
        assert!((frame_past as f64 - (48_000.0 + 10.0 * tick_size_60)).abs() < 1.0);
    }

    #[test]
    fn relocation_rounding_rule() {
        assert_eq!(round_tick_for_relocation(3.969), 3.969);
        assert_eq!(round_tick_for_relocation(3.97), 4.0);
        assert_eq!(round_tick_for_relocation(3.999), 4.0);
    }

    #[test]
    fn negative_tick_is_rejected() {
        let map = TempoMap::Constant(120.0);
        assert!(frame_for_tick(&map, 48_000, 48, -1.0).is_err());
    }

    #[test]
    fn bpm_at_tick_picks_latest_marker_not_after_tick() {
        let map = TempoMap::Timeline(vec![
            TempoMarker { start_tick: 0.0, bpm: 120.0 },
            TempoMarker { start_tick: 96.0, bpm: 90.0 },
        ]);
        assert_eq!(map.bpm_at_tick(0.0), 120.0);
        assert_eq!(map.bpm_at_tick(95.9), 120.0);
        assert_eq!(map.bpm_at_tick(96.0), 90.0);
        assert_eq!(map.bpm_at_tick(1000.0), 90.0);
    }
}
