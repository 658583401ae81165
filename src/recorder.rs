//! Recorder: assembles per-track recordings of everything actually sent.
//!
//! The recorder observes moments in exactly the order the scheduler
//! dispatches them. Two append paths exist: moments dispatched from the
//! compiled score, and synthetic moments built from the live performer's
//! controller substitution — the latter are only legal while a chord is
//! actually sounding on that track.

use tracing::warn;

use crate::error::CoreError;
use crate::midi::MidiMessage;
use crate::moment::{MergeOrder, Moment};

#[derive(Debug)]
struct RecorderTrack {
    channel: u8,
    moments: Vec<Moment>,
    /// Toggled by chord/rest start markers as score moments arrive.
    in_chord: bool,
}

#[derive(Debug)]
pub struct Recorder {
    tracks: Vec<RecorderTrack>,
}

impl Recorder {
    /// One recording track per performance track, matched by channel.
    pub fn for_channels(channels: impl IntoIterator<Item = u8>) -> Self {
        Self {
            tracks: channels
                .into_iter()
                .map(|channel| RecorderTrack {
                    channel,
                    moments: Vec::new(),
                    in_chord: false,
                })
                .collect(),
        }
    }

    fn track_mut(&mut self, channel: u8) -> Result<&mut RecorderTrack, CoreError> {
        self.tracks
            .iter_mut()
            .find(|t| t.channel == channel)
            .ok_or(CoreError::UnknownChannel { channel })
    }

    /// Record a moment dispatched from the compiled score.
    pub fn add_live_score_moment(&mut self, channel: u8, moment: &Moment, timestamp_ms: f64) {
        let Ok(track) = self.track_mut(channel) else {
            warn!(channel, "dispatched moment for unrecorded channel");
            return;
        };
        if moment.chord_start {
            track.in_chord = true;
        }
        if moment.rest_start {
            track.in_chord = false;
        }
        if moment.messages.is_empty() {
            return;
        }
        track.record(moment.messages.clone(), timestamp_ms);
    }

    /// Record a synthetic moment from live-performer controller substitution.
    /// Only accepted while a chord is sounding on the target track.
    pub fn add_live_performers_control_moment(
        &mut self,
        channel: u8,
        messages: Vec<MidiMessage>,
        timestamp_ms: f64,
    ) -> Result<(), CoreError> {
        let track = self.track_mut(channel)?;
        if !track.in_chord {
            return Err(CoreError::ControlOutsideChord { channel });
        }
        track.record(messages, timestamp_ms);
        Ok(())
    }

    pub fn into_recording(self) -> Recording {
        Recording {
            tracks: self
                .tracks
                .into_iter()
                .map(|t| RecordedTrack {
                    channel: t.channel,
                    moments: t.moments,
                })
                .collect(),
        }
    }
}

impl RecorderTrack {
    /// Append under the live-merge rule: a timestamp at or before the last
    /// recorded one indicates near-simultaneous events, whose messages are
    /// prepended so note-offs are not shadowed by an already-recorded
    /// note-on. A strictly earlier timestamp is scheduling jitter and is
    /// clamped forward.
    fn record(&mut self, messages: Vec<MidiMessage>, timestamp_ms: f64) {
        let moment = Moment {
            timestamp: Some(timestamp_ms),
            messages,
            ..Moment::default()
        };
        if let Some(last) = self.moments.last_mut() {
            let last_ts = last.timestamp.unwrap_or(0.0);
            if timestamp_ms <= last_ts {
                if timestamp_ms < last_ts {
                    warn!(
                        channel = self.channel,
                        timestamp_ms, last_ts, "recorded moment out of order; clamping forward"
                    );
                }
                last.merge(moment, MergeOrder::Prepend);
                return;
            }
        }
        self.moments.push(moment);
    }
}

/// What was actually sent during a performance: per-track ordered moments
/// with absolute send timestamps. Score positions have no meaning here; an
/// external Standard-MIDI-File serializer consumes this.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub tracks: Vec<RecordedTrack>,
}

#[derive(Debug, Clone)]
pub struct RecordedTrack {
    pub channel: u8,
    pub moments: Vec<Moment>,
}

impl Recording {
    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.moments.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_moment(messages: &[MidiMessage], chord_start: bool) -> Moment {
        Moment {
            messages: messages.to_vec(),
            chord_start,
            ..Moment::default()
        }
    }

    #[test]
    fn appends_in_order() {
        let mut recorder = Recorder::for_channels([0]);
        let on = MidiMessage::note_on(0, 60, 80);
        let off = MidiMessage::note_off(0, 60, 127);
        recorder.add_live_score_moment(0, &score_moment(&[on], true), 10.0);
        recorder.add_live_score_moment(0, &score_moment(&[off], false), 20.0);
        let recording = recorder.into_recording();
        assert_eq!(recording.tracks[0].moments.len(), 2);
        assert_eq!(recording.tracks[0].moments[0].timestamp, Some(10.0));
    }

    #[test]
    fn equal_timestamp_prepends_messages() {
        let mut recorder = Recorder::for_channels([0]);
        let on = MidiMessage::note_on(0, 60, 80);
        let off = MidiMessage::note_off(0, 64, 127);
        recorder.add_live_score_moment(0, &score_moment(&[on], true), 10.0);
        recorder.add_live_score_moment(0, &score_moment(&[off], false), 10.0);
        let recording = recorder.into_recording();
        let moments = &recording.tracks[0].moments;
        assert_eq!(moments.len(), 1);
        // The later arrival's note-off comes first.
        assert_eq!(moments[0].messages[0].data1(), 64);
        assert_eq!(moments[0].messages[1].data1(), 60);
    }

    #[test]
    fn earlier_timestamp_is_clamped_and_prepended() {
        let mut recorder = Recorder::for_channels([0]);
        let on = MidiMessage::note_on(0, 60, 80);
        let off = MidiMessage::note_off(0, 60, 127);
        recorder.add_live_score_moment(0, &score_moment(&[on], true), 10.0);
        recorder.add_live_score_moment(0, &score_moment(&[off], false), 9.5);
        let recording = recorder.into_recording();
        let moments = &recording.tracks[0].moments;
        assert_eq!(moments.len(), 1);
        assert_eq!(moments[0].timestamp, Some(10.0));
    }

    #[test]
    fn control_moment_requires_active_chord() {
        let mut recorder = Recorder::for_channels([0]);
        let cc = MidiMessage::control_change(0, 7, 100);
        let err = recorder
            .add_live_performers_control_moment(0, vec![cc], 5.0)
            .unwrap_err();
        assert!(matches!(err, CoreError::ControlOutsideChord { channel: 0 }));

        let on = MidiMessage::note_on(0, 60, 80);
        recorder.add_live_score_moment(0, &score_moment(&[on], true), 10.0);
        recorder
            .add_live_performers_control_moment(0, vec![cc], 12.0)
            .unwrap();
    }

    #[test]
    fn rest_start_closes_the_chord_window() {
        let mut recorder = Recorder::for_channels([0]);
        let on = MidiMessage::note_on(0, 60, 80);
        let cc = MidiMessage::control_change(0, 7, 100);
        recorder.add_live_score_moment(0, &score_moment(&[on], true), 10.0);
        let rest = Moment {
            rest_start: true,
            ..Moment::default()
        };
        recorder.add_live_score_moment(0, &rest, 20.0);
        assert!(
            recorder
                .add_live_performers_control_moment(0, vec![cc], 25.0)
                .is_err()
        );
    }
}
