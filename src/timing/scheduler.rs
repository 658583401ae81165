//! The scheduler: walks multiple parallel per-track moment sequences,
//! assigns absolute send-times under a variable speed factor, and dispatches
//! due messages from a cooperative tick loop.
//!
//! The scheduler never reads a clock or owns a timer. Every entry point takes
//! `now_ms`; a tick drains everything due and reports how long the caller
//! should sleep before the next one. The engine thread supplies wake-ups,
//! tests supply plain numbers.

use crossbeam::channel::Sender;
use tracing::debug;

use crate::device::SharedDevice;
use crate::error::CoreError;
use crate::midi::MidiMessage;
use crate::moment::Moment;
use crate::recorder::{Recorder, Recording};

use super::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Running,
    Paused,
}

impl PlayerState {
    fn name(self) -> &'static str {
        match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Running => "running",
            PlayerState::Paused => "paused",
        }
    }
}

/// What happens when the end of the played range is reached.
///
/// `HoldForPerformer` stops the transport silently, leaving the recording
/// armed: the live performer's next input decides what plays next, and the
/// eventual explicit `stop` finalizes one recording for the whole
/// performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfRange {
    ReportPerformance,
    HoldForPerformer,
}

/// Result of one tick: either sleep this long before the next tick, or
/// nothing is scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    WaitMs(f64),
    Idle,
}

#[derive(Debug)]
pub enum SchedulerEvent {
    /// Reported at most once per distinct chord/rest start position; drives
    /// an external cursor display.
    PositionChanged { position_ms: u32 },
    /// Reported exactly once per performance.
    PerformanceEnded {
        recording: Recording,
        elapsed_ms: f64,
    },
}

#[derive(Debug, Clone, Copy)]
struct CurrentEvent {
    track: usize,
    position_ms: u32,
    timestamp_ms: f64,
}

pub struct Scheduler {
    tracks: Vec<Track>,
    state: PlayerState,
    device: SharedDevice,
    event_tx: Sender<SchedulerEvent>,
    speed_factor: f64,
    end_behavior: EndOfRange,
    /// Wall-clock start of the whole performance, shifted forward on resume
    /// so elapsed time excludes pauses. Survives span-to-span restarts in
    /// live mode.
    performance_start_ms: Option<f64>,
    prev_timestamp_ms: f64,
    prev_position_ms: u32,
    current: Option<CurrentEvent>,
    pause_instant_ms: f64,
    last_reported_position: Option<u32>,
    recorder: Option<Recorder>,
}

impl Scheduler {
    pub fn new(tracks: Vec<Track>, device: SharedDevice, event_tx: Sender<SchedulerEvent>) -> Self {
        Self {
            tracks,
            state: PlayerState::Stopped,
            device,
            event_tx,
            speed_factor: 1.0,
            end_behavior: EndOfRange::ReportPerformance,
            performance_start_ms: None,
            prev_timestamp_ms: 0.0,
            prev_position_ms: 0,
            current: None,
            pause_instant_ms: 0.0,
            last_reported_position: None,
            recorder: None,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Rescales all subsequently computed timestamps; already-assigned ones
    /// are unaffected.
    pub fn set_speed_factor(&mut self, factor: f64) {
        self.speed_factor = factor;
    }

    /// Arm a recording sink for the coming performance.
    pub fn arm_recorder(&mut self, recorder: Recorder) {
        self.recorder = Some(recorder);
    }

    /// Start playing `[start_ms, end_ms)`. A track performs only if enabled
    /// and non-empty in the requested range.
    pub fn play(
        &mut self,
        start_ms: u32,
        end_ms: u32,
        track_enabled: &[bool],
        end_behavior: EndOfRange,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        if self.state != PlayerState::Stopped {
            return Err(CoreError::InvalidTransition {
                state: self.state.name(),
                action: "play",
            });
        }
        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.set_range(start_ms, end_ms);
            track.is_performing =
                track_enabled.get(i).copied().unwrap_or(false) && !track.is_empty_in_range();
        }
        self.end_behavior = end_behavior;
        self.performance_start_ms.get_or_insert(now_ms);
        self.prev_timestamp_ms = now_ms;
        self.prev_position_ms = start_ms;
        self.last_reported_position = None;
        self.state = PlayerState::Running;
        self.advance_to_next_event();
        debug!(start_ms, end_ms, "playback started");
        Ok(())
    }

    /// Run the tick body: dispatch everything due at `now_ms`, then report
    /// the delay until the next event. Reaching the end of the range stops
    /// the scheduler.
    pub fn tick(&mut self, now_ms: f64) -> TickOutcome {
        if self.state != PlayerState::Running {
            return TickOutcome::Idle;
        }
        while let Some(current) = self.current {
            if current.timestamp_ms > now_ms {
                return TickOutcome::WaitMs(current.timestamp_ms - now_ms);
            }
            self.dispatch(current);
        }
        match self.end_behavior {
            EndOfRange::ReportPerformance => self.stop(now_ms),
            EndOfRange::HoldForPerformer => self.halt(),
        }
        TickOutcome::Idle
    }

    /// Only valid while running: freezes the current moment and the clock
    /// baseline until `resume`.
    pub fn pause(&mut self, now_ms: f64) -> Result<(), CoreError> {
        if self.state != PlayerState::Running {
            return Err(CoreError::InvalidTransition {
                state: self.state.name(),
                action: "pause",
            });
        }
        self.pause_instant_ms = now_ms;
        self.state = PlayerState::Paused;
        Ok(())
    }

    /// Only valid while paused: shifts the frozen moment, the timestamp
    /// baseline and the performance start forward by the paused duration.
    pub fn resume(&mut self, now_ms: f64) -> Result<(), CoreError> {
        if self.state != PlayerState::Paused {
            return Err(CoreError::InvalidTransition {
                state: self.state.name(),
                action: "resume",
            });
        }
        let paused_ms = now_ms - self.pause_instant_ms;
        if let Some(current) = &mut self.current {
            current.timestamp_ms += paused_ms;
            let track = &mut self.tracks[current.track];
            if let Some(moment) = track.current_mut() {
                moment.timestamp = Some(current.timestamp_ms);
            }
        }
        self.prev_timestamp_ms += paused_ms;
        if let Some(start) = &mut self.performance_start_ms {
            *start += paused_ms;
        }
        self.state = PlayerState::Running;
        Ok(())
    }

    /// Stop from running or paused, finalize the recording, and report the
    /// performance end with elapsed non-paused time. A no-op while already
    /// stopped.
    pub fn stop(&mut self, now_ms: f64) {
        if self.state == PlayerState::Stopped && self.performance_start_ms.is_none() {
            return;
        }
        let reference = match self.state {
            PlayerState::Paused => self.pause_instant_ms,
            _ => now_ms,
        };
        let elapsed_ms = reference - self.performance_start_ms.unwrap_or(reference);
        let recording = self
            .recorder
            .take()
            .map(Recorder::into_recording)
            .unwrap_or_default();
        self.halt();
        self.performance_start_ms = None;
        let _ = self.event_tx.send(SchedulerEvent::PerformanceEnded {
            recording,
            elapsed_ms,
        });
        debug!(elapsed_ms, "performance ended");
    }

    /// Drain all remaining events of the current range without honoring
    /// timestamps, emitting only note-offs (and zero-velocity note-ons) so no
    /// note hangs and nothing audibly double-triggers, then halt. Used when a
    /// live performer supplies a new note before the scheduled span has
    /// finished.
    pub fn finish_silently(&mut self, now_ms: f64) {
        while let Some(current) = self.current {
            let track = &mut self.tracks[current.track];
            let moment = track
                .current()
                .expect("current event must point at a live cursor");
            let silenced = Moment {
                position_in_score: moment.position_in_score,
                timestamp: Some(now_ms),
                messages: moment
                    .messages
                    .iter()
                    .filter(|m| m.silences_note())
                    .copied()
                    .collect(),
                chord_start: moment.chord_start,
                rest_start: moment.rest_start,
            };
            {
                let mut device = self.device.lock();
                for message in &silenced.messages {
                    device.send(message.as_bytes(), now_ms);
                }
            }
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.add_live_score_moment(track.channel, &silenced, now_ms);
            }
            track.advance();
            self.advance_to_next_event();
        }
        self.halt();
    }

    /// Forward a live-performer substitution moment to the recording and the
    /// device. Fatal if the target track has no sounding chord; a rejected
    /// moment is never sent.
    pub fn emit_live_control(
        &mut self,
        channel: u8,
        messages: Vec<MidiMessage>,
        now_ms: f64,
    ) -> Result<(), CoreError> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.add_live_performers_control_moment(channel, messages.clone(), now_ms)?;
        }
        let mut device = self.device.lock();
        for message in &messages {
            device.send(message.as_bytes(), now_ms);
        }
        Ok(())
    }

    /// Stop the transport without finalizing the recording or reporting.
    fn halt(&mut self) {
        self.state = PlayerState::Stopped;
        self.current = None;
    }

    /// Pick the next due moment: the smallest score position across all
    /// performing tracks, timestamped against the previously dispatched
    /// moment under the current speed factor.
    fn advance_to_next_event(&mut self) {
        let next = self
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.current().map(|m| (i, m.position_in_score)))
            .min_by_key(|&(_, position)| position);
        self.current = next.map(|(track, position_ms)| {
            let delta = f64::from(position_ms - self.prev_position_ms);
            let timestamp_ms = self.prev_timestamp_ms + delta * self.speed_factor;
            if let Some(moment) = self.tracks[track].current_mut() {
                moment.timestamp = Some(timestamp_ms);
            }
            CurrentEvent {
                track,
                position_ms,
                timestamp_ms,
            }
        });
    }

    fn dispatch(&mut self, current: CurrentEvent) {
        let track = &mut self.tracks[current.track];
        let moment = track
            .current()
            .expect("current event must point at a live cursor")
            .clone();
        {
            let mut device = self.device.lock();
            for message in &moment.messages {
                device.send(message.as_bytes(), current.timestamp_ms);
            }
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.add_live_score_moment(
                self.tracks[current.track].channel,
                &moment,
                current.timestamp_ms,
            );
        }
        if (moment.chord_start || moment.rest_start)
            && self.last_reported_position != Some(current.position_ms)
        {
            let _ = self.event_tx.send(SchedulerEvent::PositionChanged {
                position_ms: current.position_ms,
            });
            self.last_reported_position = Some(current.position_ms);
        }
        self.tracks[current.track].advance();
        self.prev_timestamp_ms = current.timestamp_ms;
        self.prev_position_ms = current.position_ms;
        self.advance_to_next_event();
    }
}
