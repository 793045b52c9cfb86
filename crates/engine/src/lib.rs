//! The engine half of the transport/scheduling core: state machine, process
//! callback, the engine lock, and the driver/renderer/event boundaries
//! (spec §4.5/§5/§6). Built on top of `daw_transport`'s pure tick/frame and
//! note-queue primitives.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod humanize;
pub mod renderer;
pub mod scheduler;
pub mod state;

pub use config::{EngineConfig, MidiDriver};
pub use driver::{DriverAdapter, DriverTag, ExternalClock, FakeDriver, NullDriver};
pub use engine::{Engine, ProcessOutcome};
pub use error::Error;
pub use event::{Event, EventConsumer, EventProducer, event_channel};
pub use renderer::{NullRenderer, RendererAdapter};
pub use scheduler::{PlaybackMode, Scheduler, SchedulerOutcome};
pub use state::State;
