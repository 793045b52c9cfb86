//! The `DriverAdapter` boundary (spec §6): a thin trait over the host audio
//! driver. Concrete OS backends (ALSA, JACK, CoreAudio, ...) are out of
//! scope; this crate ships only the two deterministic/no-op adapters tests
//! and embedders need, `NullDriver` and `FakeDriver`, plus the
//! `ExternalClock` capability used by §4.5.3's master-clock priority chain.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Recognised driver tags, probed in this order when `Auto` is requested
/// (spec §6). Only `Fake` and `Null` are actually implemented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverTag {
    Auto,
    Oss,
    Alsa,
    Jack,
    PortAudio,
    CoreAudio,
    PulseAudio,
    /// Synchronous, in-process test driver.
    Fake,
    DiskWriter,
    Null,
}

impl DriverTag {
    pub const ALL_IN_PROBE_ORDER: &'static [DriverTag] = &[
        DriverTag::Oss,
        DriverTag::Alsa,
        DriverTag::Jack,
        DriverTag::PortAudio,
        DriverTag::CoreAudio,
        DriverTag::PulseAudio,
        DriverTag::Null,
    ];
}

/// Capability to synchronize transport against an external master clock
/// (e.g. a JACK-like transport). One implementation, `ExternalClock`, is
/// named in spec §9's design notes; this crate only defines the trait.
pub trait ExternalClock: Send {
    fn is_master(&self) -> bool;
    fn query_position(&self) -> i64;
    fn query_bpm(&self) -> f64;
    fn relocate(&mut self, frame: i64);
    fn start(&mut self);
    fn stop(&mut self);
}

/// Thin boundary over the host audio driver (spec §6).
pub trait DriverAdapter: Send {
    fn init(&mut self, buffer_size: u32) -> Result<(), Error>;
    fn connect(&mut self) -> Result<(), Error>;
    fn disconnect(&mut self);
    fn sample_rate(&self) -> u32;

    /// Mutable slices into this cycle's output buffers, length ==
    /// whatever `buffer_size` was requested by the last `process` call.
    fn out_l(&mut self) -> &mut [f32];
    fn out_r(&mut self) -> &mut [f32];

    /// Both output buffers at once, borrowed disjointly so a renderer can
    /// write `L`/`R` in the same call. `out_l`/`out_r` alone can't be
    /// combined like this from outside the impl since they each take
    /// `&mut self`.
    fn output_buffers(&mut self) -> (&mut [f32], &mut [f32]);

    fn clear_per_track_buffers(&mut self, n_frames: usize);

    fn is_external_master(&self) -> bool {
        false
    }
    fn master_bpm(&self) -> Option<f64> {
        None
    }
    fn relocate_transport(&mut self, _frame: i64) {}
    fn start_transport(&mut self) {}
    fn stop_transport(&mut self) {}
    fn update_transport_position(&mut self) {}

    /// Whether a failed lock acquisition should be retried (disk-writer)
    /// rather than silently skipped (spec §4.5.2 step 2).
    fn is_disk_writer(&self) -> bool {
        false
    }
}

/// Emits silence and never fails; the automatic fallback target when driver
/// startup fails (spec §7).
pub struct NullDriver {
    sample_rate: u32,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
}

impl NullDriver {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            out_l: Vec::new(),
            out_r: Vec::new(),
        }
    }
}

impl DriverAdapter for NullDriver {
    fn init(&mut self, buffer_size: u32) -> Result<(), Error> {
        self.out_l = vec![0.0; buffer_size as usize];
        self.out_r = vec![0.0; buffer_size as usize];
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn out_l(&mut self) -> &mut [f32] {
        &mut self.out_l
    }

    fn out_r(&mut self) -> &mut [f32] {
        &mut self.out_r
    }

    fn output_buffers(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.out_l, &mut self.out_r)
    }

    fn clear_per_track_buffers(&mut self, _n_frames: usize) {}
}

/// Synchronous driver for deterministic tests: the caller drives `process`
/// directly, there is no real callback thread. Directly analogous to
/// Hydrogen's own `Fake` driver tag.
pub struct FakeDriver {
    sample_rate: u32,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
    pub is_master: bool,
    pub master_bpm: Option<f64>,
    pub relocated_to: Option<i64>,
}

impl FakeDriver {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            out_l: Vec::new(),
            out_r: Vec::new(),
            is_master: false,
            master_bpm: None,
            relocated_to: None,
        }
    }
}

impl DriverAdapter for FakeDriver {
    fn init(&mut self, buffer_size: u32) -> Result<(), Error> {
        self.out_l = vec![0.0; buffer_size as usize];
        self.out_r = vec![0.0; buffer_size as usize];
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn out_l(&mut self) -> &mut [f32] {
        &mut self.out_l
    }

    fn out_r(&mut self) -> &mut [f32] {
        &mut self.out_r
    }

    fn output_buffers(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.out_l, &mut self.out_r)
    }

    fn clear_per_track_buffers(&mut self, _n_frames: usize) {}

    fn is_external_master(&self) -> bool {
        self.is_master
    }

    fn master_bpm(&self) -> Option<f64> {
        self.master_bpm
    }

    fn relocate_transport(&mut self, frame: i64) {
        self.relocated_to = Some(frame);
    }
}
