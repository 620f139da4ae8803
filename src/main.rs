// src/main.rs

use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};

use multitrack_player::audio_runtime::AudioRuntime;
use multitrack_player::config::PlayerConfig;
use multitrack_player::controller::StemController;
use multitrack_player::decoder::SymphoniaLoader;
use multitrack_player::engine::Engine;

/// Command-line arguments for stem-player
#[derive(Parser, Debug)]
#[command(name = "stem-player")]
#[command(about = "Plays a set of stems in lockstep with per-track mixing")]
#[command(version)]
struct Args {
    /// JSON stem-set configuration
    #[arg(short, long, conflicts_with = "files")]
    config: Option<PathBuf>,

    /// Audio files to play as individual tracks
    files: Vec<PathBuf>,

    /// Start with looping enabled
    #[arg(short, long = "loop")]
    looping: bool,

    /// Initial playback rate
    #[arg(short, long, default_value_t = 1.0)]
    rate: f64,
}

// Roughly one display refresh.
const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for scheduling detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let config = match (&args.config, args.files.is_empty()) {
        (Some(path), _) => {
            let mut config = PlayerConfig::load_from_disk(path)?;
            if let Some(base) = path.parent() {
                config.resolve_paths(base);
            }
            config
        }
        (None, false) => PlayerConfig::from_files(&args.files)?,
        (None, true) => PlayerConfig::default(),
    };
    log::info!("stem-player starting with {} track(s)", config.tracks.len());

    let (runtime, graph) =
        AudioRuntime::open(config.tracks.len()).context("Failed to open audio output")?;
    let loader = Arc::new(SymphoniaLoader::new(Some(runtime.sample_rate())));

    let mut engine = Engine::new(config.track_specs(), graph, runtime, config.engine_settings());
    engine
        .set_playback_rate(args.rate)
        .context("Invalid --rate")?;
    if args.looping {
        engine.set_loop(true);
    }
    engine.begin_loading(loader);

    let mut controller = StemController::new(engine, config.skip_seconds);

    let mut out = stdout();
    enable_raw_mode()?;
    execute!(out, Clear(ClearType::All))?;
    let result = run(&mut controller, &mut out);
    disable_raw_mode()?;
    println!();
    result
}

fn run<G, C>(controller: &mut StemController<G, C>, out: &mut std::io::Stdout) -> Result<()>
where
    G: multitrack_player::engine::AudioGraph,
    C: multitrack_player::engine::AudioClock,
{
    controller.run_tick(out)?;
    loop {
        if event::poll(FRAME)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press && controller.handle_key(ev.code, ev.modifiers) {
                    break;
                }
            }
        }
        controller.run_tick(out)?;
    }
    controller.engine_mut().pause();
    Ok(())
}
