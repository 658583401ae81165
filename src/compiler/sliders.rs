//! Continuous-controller ("slider") resampling.
//!
//! Slider arrays are sampled at arbitrary density in the score; here they are
//! resampled onto the chord's fixed slot grid and turned into controller
//! messages, suppressing redundant repeats.

use crate::midi::{MidiMessage, control};
use crate::moment::Moment;
use crate::score::Sliders;

/// Width of one slider slot in milliseconds.
pub const SLIDER_PERIOD_MS: u32 = 10;

#[derive(Debug, Clone, Copy)]
enum SliderKind {
    PitchWheel,
    Pan,
    Modulation,
    Expression,
}

impl SliderKind {
    fn message(self, channel: u8, value: u8) -> MidiMessage {
        match self {
            SliderKind::PitchWheel => MidiMessage::pitch_wheel(channel, value),
            SliderKind::Pan => MidiMessage::control_change(channel, control::PAN, value),
            SliderKind::Modulation => {
                MidiMessage::control_change(channel, control::MODULATION, value)
            }
            SliderKind::Expression => {
                MidiMessage::control_change(channel, control::EXPRESSION, value)
            }
        }
    }
}

/// Compile every defined slider onto the slot grid for `duration_ms`.
///
/// Returns ascending chord-relative moments; slots where no slider changes
/// value are dropped entirely.
pub(crate) fn compile_sliders(channel: u8, sliders: &Sliders, duration_ms: u32) -> Vec<Moment> {
    let slot_count = ((duration_ms / SLIDER_PERIOD_MS) as usize).max(1);

    let defined: [(SliderKind, Option<&Vec<u8>>); 4] = [
        (SliderKind::PitchWheel, sliders.pitch_wheel.as_ref()),
        (SliderKind::Pan, sliders.pan.as_ref()),
        (SliderKind::Modulation, sliders.modulation.as_ref()),
        (SliderKind::Expression, sliders.expression.as_ref()),
    ];

    let mut per_slot: Vec<Vec<MidiMessage>> = vec![Vec::new(); slot_count];
    for (kind, values) in defined {
        let Some(values) = values else { continue };
        // A single value means "no change": nothing to send.
        if values.len() < 2 {
            continue;
        }
        let resampled = resample(values, slot_count);
        let mut previous = None;
        for (slot, &value) in resampled.iter().enumerate() {
            if previous != Some(value) {
                per_slot[slot].push(kind.message(channel, value));
                previous = Some(value);
            }
        }
    }

    per_slot
        .into_iter()
        .enumerate()
        .filter(|(_, messages)| !messages.is_empty())
        .map(|(slot, messages)| {
            let position = (slot as u64 * u64::from(duration_ms)) as f64 / slot_count as f64;
            let mut moment = Moment::at(position.round() as u32);
            moment.messages = messages;
            moment
        })
        .collect()
}

/// Resample a source value array to exactly `slot_count` values.
fn resample(values: &[u8], slot_count: usize) -> Vec<u8> {
    use std::cmp::Ordering;
    match values.len().cmp(&slot_count) {
        Ordering::Equal => values.to_vec(),
        Ordering::Less => stretch_contour(values, slot_count),
        Ordering::Greater => decimate(values, slot_count),
    }
}

/// Stretch a short contour over a longer slot grid: original indices map to
/// spread-out "peak" slots (endpoints pinned), with a floored linear ramp
/// filling the gaps.
fn stretch_contour(values: &[u8], slot_count: usize) -> Vec<u8> {
    debug_assert!(values.len() >= 2 && values.len() < slot_count);
    let last = values.len() - 1;
    let mut out = vec![0u8; slot_count];
    out[0] = values[0];

    let mut prev_slot = 0usize;
    let mut prev_value = values[0];
    for (i, &value) in values.iter().enumerate().skip(1) {
        let slot = if i == last {
            slot_count - 1
        } else {
            (i * slot_count / last).min(slot_count - 1)
        };
        let span = (slot - prev_slot) as f64;
        for s in (prev_slot + 1)..=slot {
            let ramp = f64::from(prev_value)
                + (f64::from(value) - f64::from(prev_value)) * (s - prev_slot) as f64 / span;
            out[s] = ramp.floor() as u8;
        }
        prev_slot = slot;
        prev_value = value;
    }
    out
}

/// Downsample a long array: first value, every `len/slots`-th value, last
/// value.
fn decimate(values: &[u8], slot_count: usize) -> Vec<u8> {
    debug_assert!(values.len() > slot_count);
    let mut out = Vec::with_capacity(slot_count);
    out.push(values[0]);
    if slot_count > 1 {
        let stride = values.len() / slot_count;
        for k in 1..slot_count - 1 {
            out.push(values[k * stride]);
        }
        out.push(*values.last().unwrap());
    }
    out
}
