//! Raw MIDI messages and live-input classification.
//!
//! The core works on plain 2- or 3-byte channel messages; anything richer
//! (SMF parsing, SysEx payloads) belongs to external collaborators.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_WHEEL: u8 = 0xE0;
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// Control-change controller numbers used by the compiler and the live
/// performer's substitution logic.
pub mod control {
    pub const BANK: u8 = 0;
    pub const MODULATION: u8 = 1;
    pub const DATA_ENTRY_COARSE: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const REGISTERED_PARAMETER_FINE: u8 = 100;
    pub const REGISTERED_PARAMETER_COARSE: u8 = 101;
}

/// A single 2- or 3-byte MIDI channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    data: [u8; 3],
    len: u8,
}

impl MidiMessage {
    fn new2(status: u8, data1: u8) -> Self {
        Self {
            data: [status, data1, 0],
            len: 2,
        }
    }

    fn new3(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            data: [status, data1, data2],
            len: 3,
        }
    }

    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new3(NOTE_ON | (channel & 0x0F), pitch, velocity)
    }

    pub fn note_off(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new3(NOTE_OFF | (channel & 0x0F), pitch, velocity)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::new3(CONTROL_CHANGE | (channel & 0x0F), controller, value)
    }

    pub fn program_change(channel: u8, patch: u8) -> Self {
        Self::new2(PROGRAM_CHANGE | (channel & 0x0F), patch)
    }

    pub fn channel_pressure(channel: u8, value: u8) -> Self {
        Self::new2(CHANNEL_PRESSURE | (channel & 0x0F), value)
    }

    pub fn aftertouch(channel: u8, pitch: u8, value: u8) -> Self {
        Self::new3(AFTERTOUCH | (channel & 0x0F), pitch, value)
    }

    /// Pitch wheel with a 7-bit coarse value (LSB zero).
    pub fn pitch_wheel(channel: u8, coarse: u8) -> Self {
        Self::new3(PITCH_WHEEL | (channel & 0x0F), 0, coarse)
    }

    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }

    pub fn data1(&self) -> u8 {
        self.data[1]
    }

    pub fn data2(&self) -> u8 {
        self.data[2]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Note-off, or the equivalent zero-velocity note-on.
    pub fn silences_note(&self) -> bool {
        match self.status() {
            NOTE_OFF => true,
            NOTE_ON => self.data[2] == 0,
            _ => false,
        }
    }
}

/// Continuous controllers a live performer can drive the engine with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    ModWheel,
    PitchWheel,
    ChannelPressure,
    Aftertouch,
}

/// A classified incoming MIDI event from the live performer's device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    Controller { kind: ControllerKind, value: u8 },
    /// Recognized but irrelevant input (SysEx, real-time, unhandled controls).
    Ignored,
}

/// Classify a raw incoming event.
///
/// SysEx envelopes and legal real-time status bytes are recognized and
/// dropped. A SysEx without its terminator, or one of the undefined
/// real-time status bytes (0xF9, 0xFD), is a fatal input error.
pub fn parse_live_input(bytes: &[u8]) -> Result<LiveEvent, CoreError> {
    let status = *bytes.first().ok_or(CoreError::EmptyInput)?;

    if status >= 0xF8 {
        return match status {
            0xF9 | 0xFD => Err(CoreError::IllegalRealtimeStatus(status)),
            _ => Ok(LiveEvent::Ignored),
        };
    }
    if status == SYSEX_START {
        return if bytes.last() == Some(&SYSEX_END) {
            Ok(LiveEvent::Ignored)
        } else {
            Err(CoreError::UnterminatedSysEx)
        };
    }
    if status > SYSEX_START {
        // System common: nothing for the performance core to do.
        return Ok(LiveEvent::Ignored);
    }

    let data1 = bytes.get(1).copied().unwrap_or(0);
    let data2 = bytes.get(2).copied().unwrap_or(0);

    Ok(match status & 0xF0 {
        NOTE_ON if data2 > 0 => LiveEvent::NoteOn {
            pitch: data1,
            velocity: data2,
        },
        NOTE_ON => LiveEvent::NoteOff { pitch: data1 },
        NOTE_OFF => LiveEvent::NoteOff { pitch: data1 },
        AFTERTOUCH => LiveEvent::Controller {
            kind: ControllerKind::Aftertouch,
            value: data2,
        },
        CONTROL_CHANGE if data1 == control::MODULATION => LiveEvent::Controller {
            kind: ControllerKind::ModWheel,
            value: data2,
        },
        CHANNEL_PRESSURE => LiveEvent::Controller {
            kind: ControllerKind::ChannelPressure,
            value: data1,
        },
        PITCH_WHEEL => LiveEvent::Controller {
            kind: ControllerKind::PitchWheel,
            value: data2,
        },
        _ => LiveEvent::Ignored,
    })
}
