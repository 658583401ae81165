use std::path::PathBuf;

use concertino::{EngineCommand, EngineUpdate, MidirOutput, share, spawn_engine};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concertino=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(score_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: concertino <score.ron> [output-port-hint]");
        std::process::exit(2);
    };
    let port_hint = args.next();

    let device = match MidirOutput::connect(port_hint.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("failed to open MIDI output: {e}");
            std::process::exit(1);
        }
    };

    let engine = spawn_engine(share(device));
    let _ = engine.command_tx.send(EngineCommand::LoadScore(score_path));

    for update in engine.update_rx.iter() {
        match update {
            EngineUpdate::ScoreLoaded {
                name,
                duration_ms,
                track_count,
            } => {
                println!("loaded '{name}': {track_count} tracks, {duration_ms}ms");
                let _ = engine.command_tx.send(EngineCommand::Play {
                    start_ms: 0,
                    end_ms: duration_ms,
                    track_enabled: vec![true; track_count],
                });
            }
            EngineUpdate::Position { position_ms } => {
                println!("at {position_ms}ms");
            }
            EngineUpdate::PlaybackState { state } => {
                println!("playback: {state:?}");
            }
            EngineUpdate::PerformanceEnded {
                recording,
                elapsed_ms,
            } => {
                let moments: usize = recording.tracks.iter().map(|t| t.moments.len()).sum();
                println!("done after {elapsed_ms:.0}ms, recorded {moments} moments");
                let _ = engine.command_tx.send(EngineCommand::Shutdown);
                break;
            }
            EngineUpdate::Error { message } => {
                eprintln!("engine error: {message}");
                let _ = engine.command_tx.send(EngineCommand::Shutdown);
                std::process::exit(1);
            }
        }
    }
}
