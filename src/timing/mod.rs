mod clock;
mod scheduler;
mod track;

pub use clock::SystemClock;
pub use scheduler::{EndOfRange, PlayerState, Scheduler, SchedulerEvent, TickOutcome};
pub use track::Track;
