//! Score data model.
//!
//! Chord and rest definitions are read-only score data, loaded from a RON
//! file and compiled once per symbol into moment timelines.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compiler;
use crate::error::CoreError;
use crate::timing::Track;

/// One sub-chord phase of an ornamented chord.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicChord {
    pub pitches: Vec<u8>,
    pub velocities: Vec<u8>,
    pub duration_ms: u32,
    #[serde(default)]
    pub bank: Option<u8>,
    #[serde(default)]
    pub patch: Option<u8>,
    #[serde(default)]
    pub has_chord_off: bool,
}

/// Setup attributes for a whole ornament.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChordAttributes {
    #[serde(default)]
    pub bank: Option<u8>,
    #[serde(default)]
    pub patch: Option<u8>,
    #[serde(default)]
    pub pitch_wheel_deviation: Option<u8>,
    #[serde(default)]
    pub has_chord_off: bool,
}

impl ChordAttributes {
    pub fn is_unset(&self) -> bool {
        self.bank.is_none() && self.patch.is_none() && self.pitch_wheel_deviation.is_none()
    }
}

/// Continuous-controller value arrays sampled at arbitrary density over a
/// chord's duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sliders {
    #[serde(default)]
    pub pitch_wheel: Option<Vec<u8>>,
    #[serde(default)]
    pub pan: Option<Vec<u8>>,
    #[serde(default)]
    pub modulation: Option<Vec<u8>>,
    #[serde(default)]
    pub expression: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordDef {
    pub duration_ms: u32,
    pub basic_chords: Vec<BasicChord>,
    #[serde(default)]
    pub attributes: Option<ChordAttributes>,
    #[serde(default)]
    pub sliders: Option<Sliders>,
}

#[cfg(test)]
impl ChordDef {
    /// One note, one sub-chord, ornament-level chord-off.
    pub(crate) fn single_note(pitch: u8, velocity: u8, duration_ms: u32) -> Self {
        Self {
            duration_ms,
            basic_chords: vec![BasicChord {
                pitches: vec![pitch],
                velocities: vec![velocity],
                duration_ms,
                bank: None,
                patch: None,
                has_chord_off: false,
            }],
            attributes: Some(ChordAttributes {
                has_chord_off: true,
                ..ChordAttributes::default()
            }),
            sliders: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Symbol {
    Chord(ChordDef),
    Rest { duration_ms: u32 },
}

impl Symbol {
    pub fn duration_ms(&self) -> u32 {
        match self {
            Symbol::Chord(def) => def.duration_ms,
            Symbol::Rest { duration_ms } => *duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDef {
    pub channel: u8,
    pub symbols: Vec<Symbol>,
}

impl TrackDef {
    /// Compile every symbol in sequence into a playback track.
    pub fn compile(&self) -> Result<Track, CoreError> {
        let mut track = Track::new(self.channel);
        let mut position_ms = 0u32;
        for symbol in &self.symbols {
            match symbol {
                Symbol::Chord(def) => {
                    let moments =
                        compiler::compile_chord(self.channel, def, def.duration_ms, position_ms)?;
                    for moment in moments {
                        track.append(moment)?;
                    }
                }
                Symbol::Rest { .. } => {
                    track.append(compiler::compile_rest(position_ms))?;
                }
            }
            position_ms += symbol.duration_ms();
        }
        Ok(track)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    pub tracks: Vec<TrackDef>,
}

impl Score {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        ron::from_str(&text).map_err(|e| CoreError::ScoreParse(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| CoreError::ScoreSerialize(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Compile all tracks for one performance attempt.
    pub fn build_tracks(&self) -> Result<Vec<Track>, CoreError> {
        self.tracks.iter().map(TrackDef::compile).collect()
    }

    /// Total score duration: the furthest moment position on any track.
    pub fn duration_ms(&self) -> u32 {
        self.tracks
            .iter()
            .map(|t| t.symbols.iter().map(Symbol::duration_ms).sum::<u32>())
            .max()
            .unwrap_or(0)
    }
}
