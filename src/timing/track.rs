//! A track: an ordered moment sequence plus its playback cursor.

use crate::error::CoreError;
use crate::moment::{Moment, MergeOrder, append_moment};

/// Cursor state (`from_index`, `current_index`, `to_index`, `is_performing`)
/// is owned exclusively by the scheduler during playback; `current_index` is
/// the only field mutated during a tick.
#[derive(Debug, Clone)]
pub struct Track {
    pub channel: u8,
    pub moments: Vec<Moment>,
    pub from_index: usize,
    pub current_index: usize,
    pub to_index: usize,
    pub is_performing: bool,
}

impl Track {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            moments: Vec::new(),
            from_index: 0,
            current_index: 0,
            to_index: 0,
            is_performing: false,
        }
    }

    /// Append a compiled moment under the merge contract.
    pub fn append(&mut self, moment: Moment) -> Result<(), CoreError> {
        append_moment(&mut self.moments, moment, MergeOrder::Append)
    }

    /// Bind the cursor to `[start_ms, end_ms)`. A moment positioned exactly
    /// at the range's end is excluded.
    pub fn set_range(&mut self, start_ms: u32, end_ms: u32) {
        self.from_index = self
            .moments
            .partition_point(|m| m.position_in_score < start_ms);
        self.to_index = self
            .moments
            .partition_point(|m| m.position_in_score < end_ms);
        self.current_index = self.from_index;
    }

    pub fn has_moments_between(&self, start_ms: u32, end_ms: u32) -> bool {
        let from = self
            .moments
            .partition_point(|m| m.position_in_score < start_ms);
        let to = self
            .moments
            .partition_point(|m| m.position_in_score < end_ms);
        from < to
    }

    pub fn is_empty_in_range(&self) -> bool {
        self.from_index >= self.to_index
    }

    /// The moment under the cursor, if the track is performing and not
    /// exhausted.
    pub fn current(&self) -> Option<&Moment> {
        if self.is_performing && self.current_index < self.to_index {
            Some(&self.moments[self.current_index])
        } else {
            None
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut Moment> {
        if self.is_performing && self.current_index < self.to_index {
            Some(&mut self.moments[self.current_index])
        } else {
            None
        }
    }

    pub fn advance(&mut self) {
        self.current_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with_positions(positions: &[u32]) -> Track {
        let mut track = Track::new(0);
        for &p in positions {
            track.append(Moment::at(p)).unwrap();
        }
        track
    }

    #[test]
    fn range_excludes_moment_at_end_position() {
        let mut track = track_with_positions(&[0, 100, 200, 300]);
        track.set_range(100, 300);
        assert_eq!(track.from_index, 1);
        assert_eq!(track.to_index, 3);
        track.is_performing = true;
        assert_eq!(track.current().unwrap().position_in_score, 100);
    }

    #[test]
    fn empty_range_detected() {
        let mut track = track_with_positions(&[0, 100]);
        track.set_range(40, 90);
        assert!(track.is_empty_in_range());
        assert!(track.has_moments_between(0, 50));
        assert!(!track.has_moments_between(40, 90));
    }

    #[test]
    fn non_performing_track_has_no_current() {
        let mut track = track_with_positions(&[0]);
        track.set_range(0, 100);
        assert!(track.current().is_none());
        track.is_performing = true;
        assert!(track.current().is_some());
        track.advance();
        assert!(track.current().is_none());
    }
}
