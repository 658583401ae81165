//! Spans: maximal score segments bounded by consecutive chord/rest symbols
//! in the live performer's own track. Computed once per performer-track
//! selection; re-sliced, not recomputed, when the performed range changes.

use std::ops::Range;

use crate::score::{Symbol, TrackDef};
use crate::timing::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Chord,
    Rest,
}

#[derive(Debug, Clone)]
pub struct Span {
    pub start_ms: u32,
    pub end_ms: u32,
    pub kind: SpanKind,
    /// Per playback track: true if the track has no material in this span.
    pub track_is_empty: Vec<bool>,
}

/// One span per symbol in the performer's track, with per-track emptiness
/// precomputed against the compiled playback tracks.
pub fn compute_spans(performer: &TrackDef, tracks: &[Track]) -> Vec<Span> {
    let mut spans = Vec::with_capacity(performer.symbols.len());
    let mut position_ms = 0u32;
    for symbol in &performer.symbols {
        let end_ms = position_ms + symbol.duration_ms();
        spans.push(Span {
            start_ms: position_ms,
            end_ms,
            kind: match symbol {
                Symbol::Chord(_) => SpanKind::Chord,
                Symbol::Rest { .. } => SpanKind::Rest,
            },
            track_is_empty: tracks
                .iter()
                .map(|t| !t.has_moments_between(position_ms, end_ms))
                .collect(),
        });
        position_ms = end_ms;
    }
    spans
}

/// The index range of spans starting inside `[start_ms, end_ms)`.
pub fn slice_spans(spans: &[Span], start_ms: u32, end_ms: u32) -> Range<usize> {
    let from = spans.partition_point(|s| s.start_ms < start_ms);
    let to = spans.partition_point(|s| s.start_ms < end_ms);
    from..to
}
