//! Moments: atomic bundles of logically-simultaneous MIDI messages.
//!
//! A moment is the unit everything else trades in. Within a track, moments
//! are strictly ascending by score position; two moments landing on the same
//! position are merged into one rather than kept separate.

use std::cmp::Ordering;

use crate::error::CoreError;
use crate::midi::MidiMessage;

/// Where an incoming moment's messages land when merging into an existing
/// moment at the same position or timestamp.
///
/// `Prepend` is used during live capture: a same-or-earlier timestamp there
/// means near-simultaneous events whose note-offs must not be shadowed by an
/// already-recorded note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    Append,
    Prepend,
}

#[derive(Debug, Clone, Default)]
pub struct Moment {
    /// Position in the score, integer milliseconds.
    pub position_in_score: u32,
    /// Absolute performance-clock send time, assigned at schedule time.
    pub timestamp: Option<f64>,
    pub messages: Vec<MidiMessage>,
    /// Dispatch of this moment reports the start of a chord symbol.
    pub chord_start: bool,
    /// Dispatch of this moment reports the start of a rest symbol.
    pub rest_start: bool,
}

impl Moment {
    pub fn at(position_in_score: u32) -> Self {
        Self {
            position_in_score,
            ..Self::default()
        }
    }

    pub fn push(&mut self, message: MidiMessage) {
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Fold another moment at the same position into this one.
    pub fn merge(&mut self, other: Moment, order: MergeOrder) {
        match order {
            MergeOrder::Append => self.messages.extend(other.messages),
            MergeOrder::Prepend => {
                let mut messages = other.messages;
                messages.append(&mut self.messages);
                self.messages = messages;
            }
        }
        self.chord_start |= other.chord_start;
        self.rest_start |= other.rest_start;
    }
}

/// Append a moment to an ordered list under the merge contract: equal
/// positions merge, later positions push, earlier positions are an invariant
/// violation.
pub fn append_moment(
    moments: &mut Vec<Moment>,
    moment: Moment,
    order: MergeOrder,
) -> Result<(), CoreError> {
    if let Some(last) = moments.last_mut() {
        match moment.position_in_score.cmp(&last.position_in_score) {
            Ordering::Less => {
                return Err(CoreError::MomentOutOfOrder {
                    last: last.position_in_score,
                    position: moment.position_in_score,
                });
            }
            Ordering::Equal => {
                last.merge(moment, order);
                return Ok(());
            }
            Ordering::Greater => {}
        }
    }
    moments.push(moment);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiMessage;

    fn on(pitch: u8) -> MidiMessage {
        MidiMessage::note_on(0, pitch, 64)
    }

    #[test]
    fn equal_positions_merge_appending() {
        let mut list = Vec::new();
        let mut a = Moment::at(10);
        a.push(on(60));
        let mut b = Moment::at(10);
        b.push(on(64));
        append_moment(&mut list, a, MergeOrder::Append).unwrap();
        append_moment(&mut list, b, MergeOrder::Append).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].messages[0].data1(), 60);
        assert_eq!(list[0].messages[1].data1(), 64);
    }

    #[test]
    fn prepend_merge_puts_new_messages_first() {
        let mut list = Vec::new();
        let mut a = Moment::at(10);
        a.push(on(60));
        let mut b = Moment::at(10);
        b.push(on(64));
        append_moment(&mut list, a, MergeOrder::Append).unwrap();
        append_moment(&mut list, b, MergeOrder::Prepend).unwrap();
        assert_eq!(list[0].messages[0].data1(), 64);
        assert_eq!(list[0].messages[1].data1(), 60);
    }

    #[test]
    fn earlier_position_is_fatal() {
        let mut list = Vec::new();
        append_moment(&mut list, Moment::at(10), MergeOrder::Append).unwrap();
        let err = append_moment(&mut list, Moment::at(5), MergeOrder::Append).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MomentOutOfOrder {
                last: 10,
                position: 5
            }
        ));
    }

    #[test]
    fn merge_keeps_symbol_markers() {
        let mut list = Vec::new();
        let mut a = Moment::at(0);
        a.chord_start = true;
        append_moment(&mut list, a, MergeOrder::Append).unwrap();
        append_moment(&mut list, Moment::at(0), MergeOrder::Append).unwrap();
        assert!(list[0].chord_start);
    }
}
