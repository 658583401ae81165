//! Assisted-performance MIDI engine: compiles ornamented chords and rests
//! into timestamped moment timelines, plays them back across parallel
//! tracks, optionally paced by a live performer, and records what was
//! actually sent.

pub mod compiler;
pub mod device;
pub mod engine;
pub mod error;
pub mod midi;
pub mod moment;
pub mod performer;
pub mod recorder;
pub mod score;
pub mod timing;

pub use device::{LiveInput, MidirOutput, OutputDevice, SharedDevice, capture_live_input, share};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use error::CoreError;
pub use performer::{LivePerformerController, PerformerOptions};
pub use recorder::{Recorder, Recording};
pub use score::{ChordDef, Score, Symbol, TrackDef};
pub use timing::{EndOfRange, PlayerState, Scheduler, SchedulerEvent, Track};
