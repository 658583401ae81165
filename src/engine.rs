//! Engine thread: owns the scheduler and the live performer controller,
//! turns commands into scheduler calls, and forwards scheduler events as
//! updates.
//!
//! The thread blocks on the command channel; while the scheduler is running
//! the block carries a timeout equal to the delay until the next due moment,
//! so the channel doubles as the tick wake-up timer.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{error, info};

use crate::device::SharedDevice;
use crate::error::CoreError;
use crate::midi::parse_live_input;
use crate::performer::{LivePerformerController, PerformerOptions, compute_spans};
use crate::recorder::{Recorder, Recording};
use crate::score::Score;
use crate::timing::{
    EndOfRange, PlayerState, Scheduler, SchedulerEvent, SystemClock, TickOutcome,
};

#[derive(Debug, Clone)]
pub enum EngineCommand {
    LoadScore(PathBuf),
    Play {
        start_ms: u32,
        end_ms: u32,
        track_enabled: Vec<bool>,
    },
    PlayLive {
        options: PerformerOptions,
        start_ms: u32,
        end_ms: u32,
        track_enabled: Vec<bool>,
    },
    Pause,
    Resume,
    Stop,
    SetSpeedFactor(f64),
    LiveMidi {
        bytes: Vec<u8>,
        timestamp_ms: f64,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    ScoreLoaded {
        name: String,
        duration_ms: u32,
        track_count: usize,
    },
    Position {
        position_ms: u32,
    },
    PlaybackState {
        state: PlayerState,
    },
    PerformanceEnded {
        recording: Recording,
        elapsed_ms: f64,
    },
    Error {
        message: String,
    },
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
}

pub fn spawn_engine(device: SharedDevice) -> EngineHandle {
    let (command_tx, command_rx) = unbounded();
    let (update_tx, update_rx) = unbounded();

    std::thread::spawn(move || {
        engine_thread(device, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
    }
}

struct EngineState {
    device: SharedDevice,
    score: Option<Score>,
    scheduler: Option<Scheduler>,
    performer: Option<LivePerformerController>,
    event_rx: Option<Receiver<SchedulerEvent>>,
    reported_state: PlayerState,
}

fn engine_thread(
    device: SharedDevice,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let clock = SystemClock::new();
    let mut state = EngineState {
        device,
        score: None,
        scheduler: None,
        performer: None,
        event_rx: None,
        reported_state: PlayerState::Stopped,
    };

    loop {
        let wait = state.tick(clock.now_ms());
        state.forward_events(&update_tx);
        state.report_state_change(&update_tx);

        let command = match wait {
            Some(delay_ms) => {
                match command_rx.recv_timeout(Duration::from_secs_f64(delay_ms / 1000.0)) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match command_rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        if let Some(command) = command {
            if matches!(command, EngineCommand::Shutdown) {
                break;
            }
            if let Err(e) = state.handle_command(command, clock.now_ms(), &update_tx) {
                state.fail_safe(clock.now_ms());
                error!(error = %e, "engine command failed");
                let _ = update_tx.send(EngineUpdate::Error {
                    message: e.to_string(),
                });
            }
            state.forward_events(&update_tx);
            state.report_state_change(&update_tx);
        }
    }
}

impl EngineState {
    /// Drive the scheduler once; the returned delay becomes the command
    /// receive timeout.
    fn tick(&mut self, now_ms: f64) -> Option<f64> {
        let scheduler = self.scheduler.as_mut()?;
        match scheduler.tick(now_ms) {
            TickOutcome::WaitMs(delay_ms) => Some(delay_ms),
            TickOutcome::Idle => None,
        }
    }

    fn handle_command(
        &mut self,
        command: EngineCommand,
        now_ms: f64,
        update_tx: &Sender<EngineUpdate>,
    ) -> Result<(), CoreError> {
        match command {
            EngineCommand::LoadScore(path) => self.load_score(&path, update_tx),
            EngineCommand::Play {
                start_ms,
                end_ms,
                track_enabled,
            } => {
                self.performer = None;
                let scheduler = self.scheduler_mut()?;
                scheduler.arm_recorder(Recorder::for_channels(
                    scheduler.tracks().iter().map(|t| t.channel).collect::<Vec<_>>(),
                ));
                scheduler.play(
                    start_ms,
                    end_ms,
                    &track_enabled,
                    EndOfRange::ReportPerformance,
                    now_ms,
                )
            }
            EngineCommand::PlayLive {
                options,
                start_ms,
                end_ms,
                track_enabled,
            } => self.start_live(options, start_ms, end_ms, track_enabled),
            EngineCommand::Pause => self.scheduler_mut()?.pause(now_ms),
            EngineCommand::Resume => self.scheduler_mut()?.resume(now_ms),
            EngineCommand::Stop => {
                self.performer = None;
                self.scheduler_mut()?.stop(now_ms);
                Ok(())
            }
            EngineCommand::SetSpeedFactor(factor) => {
                self.scheduler_mut()?.set_speed_factor(factor);
                Ok(())
            }
            EngineCommand::LiveMidi {
                bytes,
                timestamp_ms,
            } => self.live_midi(&bytes, timestamp_ms),
            EngineCommand::Shutdown => Ok(()),
        }
    }

    fn load_score(
        &mut self,
        path: &std::path::Path,
        update_tx: &Sender<EngineUpdate>,
    ) -> Result<(), CoreError> {
        let score = Score::load(path)?;
        let tracks = score.build_tracks()?;
        info!(name = %score.name, tracks = tracks.len(), "score loaded");
        let (event_tx, event_rx) = unbounded();
        self.scheduler = Some(Scheduler::new(tracks, self.device.clone(), event_tx));
        self.event_rx = Some(event_rx);
        self.performer = None;
        let _ = update_tx.send(EngineUpdate::ScoreLoaded {
            name: score.name.clone(),
            duration_ms: score.duration_ms(),
            track_count: score.tracks.len(),
        });
        self.score = Some(score);
        Ok(())
    }

    fn start_live(
        &mut self,
        options: PerformerOptions,
        start_ms: u32,
        end_ms: u32,
        track_enabled: Vec<bool>,
    ) -> Result<(), CoreError> {
        let score = self.score.as_ref().ok_or(CoreError::NoScoreLoaded)?;
        let performer_def = score.tracks.get(options.performer_track).ok_or(
            CoreError::PerformerTrackOutOfRange {
                track: options.performer_track,
                count: score.tracks.len(),
            },
        )?;
        let channels: Vec<u8> = score.tracks.iter().map(|t| t.channel).collect();
        let scheduler = self.scheduler.as_mut().ok_or(CoreError::NoScoreLoaded)?;
        let spans = compute_spans(performer_def, scheduler.tracks());
        let mut performer =
            LivePerformerController::new(spans, options, channels.clone(), track_enabled)?;
        performer.set_range(start_ms, end_ms);
        scheduler.arm_recorder(Recorder::for_channels(channels));
        self.performer = Some(performer);
        info!(start_ms, end_ms, "live performance armed");
        Ok(())
    }

    fn live_midi(&mut self, bytes: &[u8], timestamp_ms: f64) -> Result<(), CoreError> {
        let event = parse_live_input(bytes)?;
        let (Some(performer), Some(scheduler)) =
            (self.performer.as_mut(), self.scheduler.as_mut())
        else {
            return Ok(());
        };
        performer.handle_event(event, scheduler, timestamp_ms)
    }

    fn scheduler_mut(&mut self) -> Result<&mut Scheduler, CoreError> {
        self.scheduler.as_mut().ok_or(CoreError::NoScoreLoaded)
    }

    /// Leave the device in a safe state before reporting a fatal error.
    fn fail_safe(&mut self, now_ms: f64) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            if scheduler.state() != PlayerState::Stopped {
                scheduler.finish_silently(now_ms);
            }
        }
    }

    fn forward_events(&mut self, update_tx: &Sender<EngineUpdate>) {
        let Some(event_rx) = &self.event_rx else {
            return;
        };
        for event in event_rx.try_iter() {
            let update = match event {
                SchedulerEvent::PositionChanged { position_ms } => {
                    EngineUpdate::Position { position_ms }
                }
                SchedulerEvent::PerformanceEnded {
                    recording,
                    elapsed_ms,
                } => EngineUpdate::PerformanceEnded {
                    recording,
                    elapsed_ms,
                },
            };
            let _ = update_tx.send(update);
        }
    }

    fn report_state_change(&mut self, update_tx: &Sender<EngineUpdate>) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        if scheduler.state() != self.reported_state {
            self.reported_state = scheduler.state();
            let _ = update_tx.send(EngineUpdate::PlaybackState {
                state: self.reported_state,
            });
        }
    }
}
