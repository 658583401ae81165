//! Live performance: span precomputation and the performer-driven
//! controller that paces the scheduler.

mod controller;
mod span;

pub use controller::{
    LivePerformerController, PerformerOptions, Substitution, SubstitutionTarget, speed_factor,
};
pub use span::{Span, SpanKind, compute_spans, slice_spans};
