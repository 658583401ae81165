//! Chord compiler: turns a chord or rest definition into an ordered sequence
//! of moments.
//!
//! Compilation is a pure function of (channel, definition, target duration,
//! score position). Ornament decomposition, attribute setup and slider
//! interpolation all happen here; the scheduler only ever sees finished
//! moment timelines.

mod sliders;

pub use sliders::SLIDER_PERIOD_MS;

use crate::error::CoreError;
use crate::midi::{MidiMessage, control};
use crate::moment::{Moment, MergeOrder, append_moment};
use crate::score::{BasicChord, ChordAttributes, ChordDef};

/// Compile a chord definition into moments at `position_ms`.
///
/// The moment list is strictly ascending in score position; moments landing
/// on the same position are merged under the moment contract. The first
/// moment carries the chord-start marker.
pub fn compile_chord(
    channel: u8,
    def: &ChordDef,
    duration_ms: u32,
    position_ms: u32,
) -> Result<Vec<Moment>, CoreError> {
    if def.basic_chords.is_empty() {
        return Err(CoreError::EmptyChord);
    }

    let mut moments: Vec<Moment> = Vec::new();

    if let Some(attributes) = &def.attributes {
        let mut setup = Moment::at(0);
        push_attribute_messages(&mut setup, channel, attributes);
        if !setup.is_empty() {
            append_moment(&mut moments, setup, MergeOrder::Append)?;
        }
    }

    let durations = redistribute_durations(&def.basic_chords, duration_ms);
    let mut running_ms = 0u32;
    // Distinct pitches note-on'd anywhere in the ornament, first-seen order.
    let mut sounded: Vec<u8> = Vec::new();

    for (basic, scaled_ms) in def.basic_chords.iter().zip(&durations) {
        let mut on = Moment::at(running_ms);
        if let Some(bank) = basic.bank {
            on.push(MidiMessage::control_change(channel, control::BANK, bank));
        }
        if let Some(patch) = basic.patch {
            on.push(MidiMessage::program_change(channel, patch));
        }
        for (i, &pitch) in basic.pitches.iter().enumerate() {
            let velocity = basic
                .velocities
                .get(i)
                .or(basic.velocities.last())
                .copied()
                .unwrap_or(64);
            on.push(MidiMessage::note_on(channel, pitch, velocity));
            if !sounded.contains(&pitch) {
                sounded.push(pitch);
            }
        }
        append_moment(&mut moments, on, MergeOrder::Append)?;

        if basic.has_chord_off {
            let mut off = Moment::at(running_ms + scaled_ms);
            for &pitch in distinct(&basic.pitches).iter() {
                off.push(MidiMessage::note_off(channel, pitch, 127));
            }
            append_moment(&mut moments, off, MergeOrder::Append)?;
        }

        running_ms += scaled_ms;
    }

    let ornament_off = def.attributes.as_ref().is_some_and(|a| a.has_chord_off);
    let mut terminal = Moment::at(duration_ms);
    if ornament_off {
        if sounded.is_empty() {
            return Err(CoreError::ChordOffWithoutNoteOn);
        }
        for &pitch in &sounded {
            terminal.push(MidiMessage::note_off(channel, pitch, 127));
        }
    }
    append_moment(&mut moments, terminal, MergeOrder::Append)?;

    if let Some(slider_defs) = &def.sliders {
        let slider_moments = sliders::compile_sliders(channel, slider_defs, duration_ms);
        moments = interleave_sliders(moments, slider_moments);
    }

    if let Some(first) = moments.first_mut() {
        first.chord_start = true;
    }
    for moment in &mut moments {
        moment.position_in_score += position_ms;
    }
    Ok(moments)
}

/// A rest compiles to a single reporting moment with no MIDI messages.
pub fn compile_rest(position_ms: u32) -> Moment {
    let mut moment = Moment::at(position_ms);
    moment.rest_start = true;
    moment
}

fn push_attribute_messages(moment: &mut Moment, channel: u8, attributes: &ChordAttributes) {
    if let Some(bank) = attributes.bank {
        moment.push(MidiMessage::control_change(channel, control::BANK, bank));
    }
    if let Some(patch) = attributes.patch {
        moment.push(MidiMessage::program_change(channel, patch));
    }
    if let Some(deviation) = attributes.pitch_wheel_deviation {
        // RPN 0,0 (pitch-bend sensitivity) then data entry, in this order.
        // Without the fine registered-parameter message the deviation has no
        // effect on conforming synthesizers.
        moment.push(MidiMessage::control_change(
            channel,
            control::REGISTERED_PARAMETER_COARSE,
            0,
        ));
        moment.push(MidiMessage::control_change(
            channel,
            control::REGISTERED_PARAMETER_FINE,
            0,
        ));
        moment.push(MidiMessage::control_change(
            channel,
            control::DATA_ENTRY_COARSE,
            deviation,
        ));
    }
}

/// Redistribute the speed-adjusted total duration across sub-chords
/// proportionally to their notated durations, in integer milliseconds, with
/// the rounding error absorbed by the last sub-chord.
fn redistribute_durations(basic_chords: &[BasicChord], total_ms: u32) -> Vec<u32> {
    let notated_total: u64 = basic_chords.iter().map(|b| u64::from(b.duration_ms)).sum();
    let count = basic_chords.len();
    let mut durations = Vec::with_capacity(count);
    let mut used = 0u32;
    for basic in &basic_chords[..count - 1] {
        let scaled = if notated_total == 0 {
            0
        } else {
            ((u64::from(basic.duration_ms) * u64::from(total_ms) + notated_total / 2)
                / notated_total) as u32
        };
        durations.push(scaled);
        used += scaled;
    }
    durations.push(total_ms.saturating_sub(used));
    durations
}

fn distinct(pitches: &[u8]) -> Vec<u8> {
    let mut seen = Vec::with_capacity(pitches.len());
    for &p in pitches {
        if !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen
}

/// Merge two position-ordered moment lists. At equal positions the slider
/// messages go before the pre-existing chord messages.
fn interleave_sliders(chord: Vec<Moment>, sliders: Vec<Moment>) -> Vec<Moment> {
    let mut merged = Vec::with_capacity(chord.len() + sliders.len());
    let mut chord_iter = chord.into_iter().peekable();
    let mut slider_iter = sliders.into_iter().peekable();

    loop {
        match (chord_iter.peek(), slider_iter.peek()) {
            (Some(c), Some(s)) => {
                if s.position_in_score < c.position_in_score {
                    merged.push(slider_iter.next().unwrap());
                } else if c.position_in_score < s.position_in_score {
                    merged.push(chord_iter.next().unwrap());
                } else {
                    let mut moment = chord_iter.next().unwrap();
                    moment.merge(slider_iter.next().unwrap(), MergeOrder::Prepend);
                    merged.push(moment);
                }
            }
            (Some(_), None) => merged.push(chord_iter.next().unwrap()),
            (None, Some(_)) => merged.push(slider_iter.next().unwrap()),
            (None, None) => break,
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PITCH_WHEEL};
    use crate::score::Sliders;

    fn basic(pitches: &[u8], velocities: &[u8], duration_ms: u32) -> BasicChord {
        BasicChord {
            pitches: pitches.to_vec(),
            velocities: velocities.to_vec(),
            duration_ms,
            bank: None,
            patch: None,
            has_chord_off: false,
        }
    }

    fn statuses(moment: &Moment) -> Vec<u8> {
        moment.messages.iter().map(|m| m.status()).collect()
    }

    #[test]
    fn empty_definition_is_fatal() {
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![],
            attributes: None,
            sliders: None,
        };
        assert!(matches!(
            compile_chord(0, &def, 100, 0),
            Err(CoreError::EmptyChord)
        ));
    }

    #[test]
    fn single_note_chord_with_chord_off() {
        // The worked example: one sub-chord, hasChordOff, 100ms.
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![basic(&[60], &[80], 100)],
            attributes: Some(ChordAttributes {
                has_chord_off: true,
                ..ChordAttributes::default()
            }),
            sliders: None,
        };
        let moments = compile_chord(0, &def, 100, 0).unwrap();
        assert_eq!(moments.len(), 2);
        assert!(moments[0].chord_start);
        assert_eq!(moments[0].position_in_score, 0);
        assert_eq!(moments[0].messages.len(), 1);
        assert_eq!(moments[0].messages[0].as_bytes(), &[0x90, 60, 80]);
        assert_eq!(moments[1].position_in_score, 100);
        assert_eq!(moments[1].messages[0].as_bytes(), &[0x80, 60, 127]);
    }

    #[test]
    fn positions_strictly_ascending() {
        let def = ChordDef {
            duration_ms: 300,
            basic_chords: vec![
                BasicChord {
                    has_chord_off: true,
                    ..basic(&[60, 64], &[80, 80], 100)
                },
                basic(&[62], &[70], 100),
                basic(&[64], &[70], 100),
            ],
            attributes: Some(ChordAttributes {
                patch: Some(5),
                has_chord_off: true,
                ..ChordAttributes::default()
            }),
            sliders: Some(Sliders {
                expression: Some(vec![0, 127]),
                ..Sliders::default()
            }),
        };
        let moments = compile_chord(0, &def, 300, 50).unwrap();
        for pair in moments.windows(2) {
            assert!(pair[0].position_in_score < pair[1].position_in_score);
        }
        assert_eq!(moments[0].position_in_score, 50);
    }

    #[test]
    fn terminal_chord_off_dedups_pitches() {
        let def = ChordDef {
            duration_ms: 200,
            basic_chords: vec![
                basic(&[60, 64], &[80, 80], 100),
                basic(&[64, 67], &[80, 80], 100),
            ],
            attributes: Some(ChordAttributes {
                has_chord_off: true,
                ..ChordAttributes::default()
            }),
            sliders: None,
        };
        let moments = compile_chord(0, &def, 200, 0).unwrap();
        let terminal = moments.last().unwrap();
        let offs: Vec<u8> = terminal
            .messages
            .iter()
            .filter(|m| m.status() == NOTE_OFF)
            .map(|m| m.data1())
            .collect();
        assert_eq!(offs, vec![60, 64, 67]);
    }

    #[test]
    fn chord_off_without_any_note_on_is_fatal() {
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![basic(&[], &[], 100)],
            attributes: Some(ChordAttributes {
                has_chord_off: true,
                ..ChordAttributes::default()
            }),
            sliders: None,
        };
        assert!(matches!(
            compile_chord(0, &def, 100, 0),
            Err(CoreError::ChordOffWithoutNoteOn)
        ));
    }

    #[test]
    fn attributes_emit_rpn_sequence_before_note_ons() {
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![basic(&[60], &[80], 100)],
            attributes: Some(ChordAttributes {
                bank: Some(1),
                patch: Some(7),
                pitch_wheel_deviation: Some(2),
                has_chord_off: false,
            }),
            sliders: None,
        };
        let moments = compile_chord(0, &def, 100, 0).unwrap();
        let first = &moments[0];
        // bank, patch, RPN coarse, RPN fine, data entry, then the note-on.
        let d1: Vec<(u8, u8)> = first
            .messages
            .iter()
            .map(|m| (m.status(), m.data1()))
            .collect();
        assert_eq!(
            d1,
            vec![
                (CONTROL_CHANGE, control::BANK),
                (0xC0, 7),
                (CONTROL_CHANGE, control::REGISTERED_PARAMETER_COARSE),
                (CONTROL_CHANGE, control::REGISTERED_PARAMETER_FINE),
                (CONTROL_CHANGE, control::DATA_ENTRY_COARSE),
                (NOTE_ON, 60),
            ]
        );
    }

    #[test]
    fn unset_attributes_emit_no_setup_moment() {
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![basic(&[60], &[80], 100)],
            attributes: Some(ChordAttributes::default()),
            sliders: None,
        };
        let moments = compile_chord(0, &def, 100, 0).unwrap();
        // First moment is the chord-on itself, terminal moment is empty.
        assert_eq!(moments[0].messages[0].status(), NOTE_ON);
        assert!(moments.last().unwrap().is_empty());
    }

    #[test]
    fn duration_redistribution_absorbs_rounding_in_last() {
        let chords = vec![
            basic(&[60], &[80], 100),
            basic(&[62], &[80], 100),
            basic(&[64], &[80], 100),
        ];
        let durations = redistribute_durations(&chords, 100);
        assert_eq!(durations.iter().sum::<u32>(), 100);
        assert_eq!(durations, vec![33, 33, 34]);
    }

    #[test]
    fn sub_chord_offs_precede_next_ons_at_same_position() {
        let def = ChordDef {
            duration_ms: 200,
            basic_chords: vec![
                BasicChord {
                    has_chord_off: true,
                    ..basic(&[60], &[80], 100)
                },
                basic(&[62], &[80], 100),
            ],
            attributes: None,
            sliders: None,
        };
        let moments = compile_chord(0, &def, 200, 0).unwrap();
        let boundary = &moments[1];
        assert_eq!(boundary.position_in_score, 100);
        assert_eq!(statuses(boundary), vec![NOTE_OFF, NOTE_ON]);
    }

    #[test]
    fn slider_messages_merge_before_chord_messages() {
        let def = ChordDef {
            duration_ms: 100,
            basic_chords: vec![basic(&[60], &[80], 100)],
            attributes: None,
            sliders: Some(Sliders {
                pitch_wheel: Some(vec![0, 127]),
                ..Sliders::default()
            }),
        };
        let moments = compile_chord(0, &def, 100, 0).unwrap();
        let first = &moments[0];
        assert_eq!(first.messages[0].status(), PITCH_WHEEL);
        assert_eq!(first.messages.last().unwrap().status(), NOTE_ON);
    }

    #[test]
    fn rest_is_one_marker_moment() {
        let moment = compile_rest(250);
        assert_eq!(moment.position_in_score, 250);
        assert!(moment.rest_start);
        assert!(moment.is_empty());
    }
}
