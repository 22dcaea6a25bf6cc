// src/main.rs

use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
    execute,
};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deck_modules::controller::{status_line, waveform_strip, PlayerController};
use deck_modules::{
    clock_sink_factory, cpal_sink_factory, EngineConfig, SessionRegistry, SymphoniaDecoder,
};

#[derive(Parser, Debug)]
#[command(name = "deck", about = "Waveform, tempo and pitch-shifted playback for audio files")]
struct Cli {
    /// JSON engine config; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode files and print waveform + tempo for each
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Points per waveform
        #[arg(long)]
        resolution: Option<usize>,
        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Interactive terminal player
    Play {
        file: PathBuf,
        /// Use a silent clock instead of the audio device
        #[arg(long)]
        mute: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, anyhow::Error> {
    match path {
        Some(p) => Ok(EngineConfig::load(p)?),
        None => Ok(EngineConfig::default()),
    }
}

fn analyze(config: EngineConfig, files: Vec<PathBuf>, json: bool) -> Result<(), anyhow::Error> {
    let mut registry = SessionRegistry::new(config, Arc::new(SymphoniaDecoder), clock_sink_factory());
    for file in files {
        registry.add(file);
    }
    // Decoding large files can take a while; the loop keeps going until all are in.
    while !registry.wait_idle(Duration::from_secs(60)) {
        log::info!("still loading {} file(s)", registry.pending_loads());
    }

    for snap in registry.poll() {
        if json {
            println!("{}", snap.to_json()?);
            continue;
        }
        println!("{}", status_line(&snap));
        for line in waveform_strip(&snap, 80, 8) {
            println!("  {}", line);
        }
        println!();
    }
    Ok(())
}

fn play(config: EngineConfig, file: PathBuf, mute: bool) -> Result<(), anyhow::Error> {
    let registry = if mute {
        SessionRegistry::new(config, Arc::new(SymphoniaDecoder), clock_sink_factory())
    } else {
        SessionRegistry::new(config, Arc::new(SymphoniaDecoder), cpal_sink_factory())
    };
    let source = file.to_string_lossy().into_owned();
    let mut deck = PlayerController::new(registry, &source);

    println!("[SPACE] Play/Pause | [S] Stop | [←/→] Seek | [↑/↓] Pitch | [0] Reset pitch | [Q] Quit");

    enable_raw_mode()?;
    execute!(stdout(), Clear(ClearType::All))?;
    let result = run_loop(&mut deck);
    disable_raw_mode()?;
    println!("\r\nExiting deck.");
    result
}

fn run_loop(deck: &mut PlayerController) -> Result<(), anyhow::Error> {
    let tick = deck.poll_interval();
    deck.run_tick()?;
    loop {
        if event::poll(tick)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if deck.should_quit(ev.code, ev.modifiers) {
                        return Ok(());
                    }
                    deck.handle_key(ev.code);
                }
            }
        }
        deck.run_tick()?;
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Analyze {
            files,
            resolution,
            json,
        } => {
            if let Some(r) = resolution {
                config.waveform_resolution = r;
                config.validate()?;
            }
            analyze(config, files, json)
        }
        Command::Play { file, mute } => play(config, file, mute),
    }
}
