//! Live performer controller: consumes the performer's classified MIDI
//! events, advances a span cursor into the scheduler, and re-routes
//! continuous controllers as speed changes and substitute control messages.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::midi::{ControllerKind, LiveEvent, MidiMessage, control};
use crate::timing::{EndOfRange, Scheduler};

use super::span::{Span, SpanKind, slice_spans};

/// Exponential speed mapping centered at controller value 64.
///
/// `cv=64` maps to 1.0, `cv=127` to `maximum`, `cv=0` to `1/maximum`. The
/// branches divide by their own step count (63 above center, 64 below) so
/// both endpoints land exactly.
pub fn speed_factor(cv: u8, maximum: f64) -> f64 {
    let cv = cv.min(127);
    if cv >= 64 {
        maximum.powf(f64::from(cv - 64) / 63.0)
    } else {
        maximum.recip().powf(f64::from(64 - cv) / 64.0)
    }
}

/// Validated live-performance configuration, produced by an external
/// options panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformerOptions {
    /// Index of the performer's own track; its symbols bound the spans.
    pub performer_track: usize,
    /// Which incoming continuous controller the engine listens to.
    pub controller: ControllerKind,
    pub map_to_speed: bool,
    pub maximum_speed_factor: f64,
    #[serde(default)]
    pub substitution: Option<Substitution>,
}

/// Re-emit the performer's controller as a control change on other tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Substitution {
    /// The control-change number sent to the targets.
    pub controller_number: u8,
    /// Volume substitution rescales the raw value before the master-volume
    /// combination.
    pub min_volume: u8,
    pub volume_scale: f64,
    pub targets: Vec<SubstitutionTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionTarget {
    pub track: usize,
    pub master_volume: u8,
}

impl Substitution {
    /// `min_volume + value * scale`, combined with the target's master
    /// volume. The product saturates to 0..=127.
    fn scaled_value(&self, target: &SubstitutionTarget, value: u8) -> u8 {
        if self.controller_number != control::VOLUME {
            return value;
        }
        let rescaled = f64::from(self.min_volume) + f64::from(value) * self.volume_scale;
        let combined = rescaled * f64::from(target.master_volume) / 127.0;
        combined.round().clamp(0.0, 127.0) as u8
    }
}

/// Advances through precomputed spans as the live performer plays. Reads
/// span/track structure and calls scheduler entry points; never mutates
/// track cursors directly.
pub struct LivePerformerController {
    spans: Vec<Span>,
    options: PerformerOptions,
    track_channels: Vec<u8>,
    track_enabled: Vec<bool>,
    range: Range<usize>,
    /// Index of the next span to play; `range.end` once exhausted.
    next_span: usize,
    held_pitch: Option<u8>,
}

impl LivePerformerController {
    pub fn new(
        spans: Vec<Span>,
        options: PerformerOptions,
        track_channels: Vec<u8>,
        track_enabled: Vec<bool>,
    ) -> Result<Self, CoreError> {
        if options.performer_track >= track_channels.len() {
            return Err(CoreError::PerformerTrackOutOfRange {
                track: options.performer_track,
                count: track_channels.len(),
            });
        }
        let range = 0..spans.len();
        Ok(Self {
            spans,
            options,
            track_channels,
            track_enabled,
            next_span: range.start,
            range,
            held_pitch: None,
        })
    }

    /// Re-slice the precomputed spans to a new performed range and rewind.
    pub fn set_range(&mut self, start_ms: u32, end_ms: u32) {
        self.range = slice_spans(&self.spans, start_ms, end_ms);
        self.next_span = self.range.start;
        self.held_pitch = None;
    }

    pub fn handle_event(
        &mut self,
        event: LiveEvent,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        match event {
            LiveEvent::NoteOn { pitch, .. } => self.strike(pitch, scheduler, now_ms),
            LiveEvent::NoteOff { pitch } => self.release(pitch, scheduler, now_ms),
            LiveEvent::Controller { kind, value } if kind == self.options.controller => {
                self.apply_controller(value, scheduler, now_ms)
            }
            LiveEvent::Controller { .. } | LiveEvent::Ignored => Ok(()),
        }
    }

    fn apply_controller(
        &mut self,
        value: u8,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        if self.options.map_to_speed {
            scheduler.set_speed_factor(speed_factor(value, self.options.maximum_speed_factor));
        }
        if let Some(substitution) = &self.options.substitution {
            for target in &substitution.targets {
                let Some(&channel) = self.track_channels.get(target.track) else {
                    continue;
                };
                let message = MidiMessage::control_change(
                    channel,
                    substitution.controller_number,
                    substitution.scaled_value(target, value),
                );
                scheduler.emit_live_control(channel, vec![message], now_ms)?;
            }
        }
        Ok(())
    }

    /// Nonzero-velocity note-on: stop at the final span, otherwise cut the
    /// in-flight span short and start the next chord span, folding any
    /// leading rest spans into the played range.
    fn strike(
        &mut self,
        pitch: u8,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        self.held_pitch = Some(pitch);
        if self.next_span >= self.range.end {
            scheduler.stop(now_ms);
            return Ok(());
        }
        scheduler.finish_silently(now_ms);

        let start = self.next_span;
        let mut end = start;
        while end < self.range.end && self.spans[end].kind == SpanKind::Rest {
            end += 1;
        }
        if end < self.range.end {
            // The chord span itself.
            end += 1;
        }
        self.next_span = end;
        self.play_spans(start..end, scheduler, now_ms)
    }

    /// Matching note-off (or zero-velocity note-on): cut the current span
    /// short, auto-play any immediately following rest spans, and stop if
    /// the range is exhausted. Unmatched pitches are ignored.
    fn release(
        &mut self,
        pitch: u8,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        if self.held_pitch != Some(pitch) {
            return Ok(());
        }
        self.held_pitch = None;
        scheduler.finish_silently(now_ms);
        if self.next_span >= self.range.end {
            scheduler.stop(now_ms);
            return Ok(());
        }
        let start = self.next_span;
        let mut end = start;
        while end < self.range.end && self.spans[end].kind == SpanKind::Rest {
            end += 1;
        }
        self.next_span = end;
        if end > start {
            self.play_spans(start..end, scheduler, now_ms)?;
        }
        Ok(())
    }

    fn play_spans(
        &self,
        indices: Range<usize>,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        let spans = &self.spans[indices];
        let start_ms = spans[0].start_ms;
        let end_ms = spans[spans.len() - 1].end_ms;
        let mask: Vec<bool> = (0..self.track_channels.len())
            .map(|t| self.track_enabled[t] && spans.iter().any(|s| !s.track_is_empty[t]))
            .collect();
        debug!(start_ms, end_ms, "playing span");
        scheduler.play(start_ms, end_ms, &mask, EndOfRange::HoldForPerformer, now_ms)
    }
}
