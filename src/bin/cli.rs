//! spatialmux CLI: list drivers, play a room config, or export it to WAV.
//!
//! Usage:
//!   sm-cli drivers
//!   sm-cli play room.yaml
//!   sm-cli render room.yaml --wav output.wav --seconds 30

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use sm_audio::{CpalHost, DriverHost};
use sm_master::{Controller, EngineConfig, PlaybackStatus};

#[derive(Parser)]
#[command(name = "sm-cli", about = "Multi-channel audio routing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List output drivers and their channel counts
    Drivers,
    /// Play a room configuration on its driver
    Play {
        /// YAML room configuration
        config: PathBuf,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Render a room configuration offline to a WAV file
    Render {
        /// YAML room configuration
        config: PathBuf,
        /// Output file
        #[arg(long)]
        wav: PathBuf,
        /// Length to render
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Drivers => list_drivers(),
        Commands::Play { config, seconds } => play(&load(&config), seconds),
        Commands::Render {
            config,
            wav,
            seconds,
        } => render(&load(&config), &wav, seconds),
    }
}

fn load(path: &Path) -> EngineConfig {
    EngineConfig::load(path).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    })
}

fn list_drivers() {
    let host = CpalHost::new();
    let names = host.driver_names();
    if names.is_empty() {
        println!("No output drivers found.");
        return;
    }
    for name in names {
        match host.open(&name) {
            Ok(session) => {
                println!("{:3} ch  {}", session.input_channel_count(), name);
                session.dispose();
            }
            Err(e) => println!("  ?     {} ({})", name, e),
        }
    }
}

fn play(config: &EngineConfig, seconds: Option<f64>) {
    let mut ctrl = Controller::new(Box::new(CpalHost::new()), config).unwrap_or_else(|e| {
        eprintln!("Failed to start: {}", e);
        std::process::exit(1);
    });
    println!(
        "Driver:   {} ({} channels)",
        ctrl.driver_name(),
        ctrl.registry().capacity()
    );
    println!("Routed:   {} of {} sources", ctrl.registry().len(), config.sources.len());
    println!();

    let started = Instant::now();
    let mut last = started;
    ctrl.tick(Duration::ZERO).unwrap_or_else(|e| log::error!("{}", e));

    while ctrl.is_active() {
        if seconds.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
        let now = Instant::now();
        if let Err(e) = ctrl.tick(now - last) {
            log::error!("{}", e);
        }
        last = now;

        let playing = ctrl
            .sources()
            .filter(|(_, s)| s.status() == PlaybackStatus::Playing)
            .count();
        print!(
            "\rTime: {:7.2}s | Playing: {:2} | Audio: {}",
            started.elapsed().as_secs_f64(),
            playing,
            if ctrl.is_audio_running() { "on " } else { "off" }
        );
        let _ = std::io::stdout().flush();
    }

    println!("\rDone.                                        ");
}

fn render(config: &EngineConfig, path: &Path, seconds: f64) {
    println!(
        "Rendering {:.1}s to {} at {} Hz, {} bit...",
        seconds,
        path.display(),
        config.sample_rate,
        config.bits_per_sample
    );

    let pcm = sm_master::render_to_wav(config, seconds, path).unwrap_or_else(|e| {
        eprintln!("Failed to render: {}", e);
        std::process::exit(1);
    });

    println!(
        "Wrote {} frames x {} channels.",
        pcm.frames(),
        pcm.channels()
    );
}
