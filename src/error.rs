//! Error types for the performance core.
//!
//! Two classes of failure are distinguished: invariant violations (malformed
//! score data, out-of-order moments, illegal transport transitions, live
//! control recorded outside a chord window) which are fatal and abort the
//! current operation, and wrapped I/O or device failures from the crate edge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("chord definition has no basic chords")]
    EmptyChord,

    #[error("ornament requests a chord-off but never sent a note-on")]
    ChordOffWithoutNoteOn,

    #[error("moment out of order: position {position}ms is earlier than {last}ms")]
    MomentOutOfOrder { last: u32, position: u32 },

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("live control moment recorded outside an active chord on channel {channel}")]
    ControlOutsideChord { channel: u8 },

    #[error("no recording track for channel {channel}")]
    UnknownChannel { channel: u8 },

    #[error("system exclusive input has no terminator byte")]
    UnterminatedSysEx,

    #[error("illegal MIDI real-time status byte 0x{0:02X}")]
    IllegalRealtimeStatus(u8),

    #[error("empty MIDI input event")]
    EmptyInput,

    #[error("no score loaded")]
    NoScoreLoaded,

    #[error("performer track index {track} out of range ({count} tracks)")]
    PerformerTrackOutOfRange { track: usize, count: usize },

    #[error("failed to read score file: {0}")]
    ScoreIo(#[from] std::io::Error),

    #[error("failed to parse score: {0}")]
    ScoreParse(String),

    #[error("failed to serialize score: {0}")]
    ScoreSerialize(String),

    #[error("MIDI device error: {0}")]
    Device(String),
}
