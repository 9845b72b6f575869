//! Strata Player - seven synchronized loops in the terminal
//!
//! This is the entry point for the terminal front-end. It:
//! 1. Starts the CPAL audio backend
//! 2. Loads the loop bank in a background thread, showing progress
//! 3. Forwards terminal intents (play/pause, mute, volume, reset) into the
//!    session and renders its state on demand
//!
//! ## Command line
//!
//! An optional positional argument overrides the configured sounds directory:
//! `strata-player /path/to/loops`

mod config;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};

use strata_core::audio::start_audio_system;
use strata_core::loader::BankLoader;
use strata_core::registry::TRACKS;
use strata_core::session::Session;
use strata_core::types::{TrackId, NUM_TRACKS};

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("strata-player starting up");

    let config_path = config::default_config_path();
    let mut cfg = config::load_config(&config_path);
    if let Some(dir) = std::env::args().nth(1) {
        cfg.sounds_dir = dir.into();
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                       Strata Player                          ║");
    println!("║                seven loops, one transport                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // A missing audio host is fatal; asset problems degrade per track instead
    let system = start_audio_system(&cfg.audio.to_audio_config())
        .context("failed to start the audio host")?;
    println!(
        "Audio host ready: {} Hz, {} frames (~{:.1}ms latency)",
        system.sample_rate, system.buffer_size, system.latency_ms
    );

    let mut session = Session::new(system);

    let loader = BankLoader::spawn(cfg.sounds_dir.clone(), session.sample_rate());
    session.begin_loading(loader.progress_handle());

    let bank = loop {
        if let Some(bank) = loader.try_recv() {
            break bank;
        }
        print!("\rLoading {:3}%", loader.progress());
        let _ = io::stdout().flush();
        std::thread::sleep(Duration::from_millis(50));
    };
    println!("\rLoading 100%");
    println!("{}/{} loops decoded", bank.loaded_count(), NUM_TRACKS);
    session.apply_bank(bank);

    print_legend(&session);
    print_help();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if !handle_command(&mut session, line.trim()) {
            break;
        }
    }

    println!("strata-player stopped.");
    Ok(())
}

/// Apply one intent line; returns false when the player should quit
fn handle_command(session: &mut Session, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None | Some("p") => {
            session.toggle_playback();
            println!("{}", if session.is_playing() { "playing" } else { "paused" });
        }
        Some("r") => {
            session.reset();
            println!("reset to loop origin");
        }
        Some("m") => match parse_track(parts.next()) {
            Some(track) => {
                session.toggle_mute(track);
                let mix = session.mix_state(track);
                println!(
                    "{} {}",
                    session.track_info(track).name,
                    if mix.muted { "muted" } else { "unmuted" }
                );
            }
            None => println!("usage: m <1-{}>", NUM_TRACKS),
        },
        Some("v") => {
            let track = parse_track(parts.next());
            let value = parts.next().and_then(|v| v.parse::<f32>().ok());
            match (track, value) {
                (Some(track), Some(value)) => {
                    // Range-input semantics: the intent is clamped here
                    let value = value.clamp(0.0, 1.0);
                    session.set_volume(track, value);
                    println!("{} volume {:.2}", session.track_info(track).name, value);
                }
                _ => println!("usage: v <1-{}> <0.0-1.0>", NUM_TRACKS),
            }
        }
        Some("s") => print_status(session),
        Some("b") => print_bands(session),
        Some("q") => return false,
        Some(other) => {
            println!("unknown command: {}", other);
            print_help();
        }
    }
    true
}

/// Parse a 1-based track number
fn parse_track(arg: Option<&str>) -> Option<TrackId> {
    arg?
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=NUM_TRACKS).contains(n))
        .map(|n| TrackId::new(n - 1))
}

fn print_legend(session: &Session) {
    println!();
    for track in TRACKS.iter() {
        let marker = if session.track_has_loop(track.id) {
            " "
        } else {
            "!"
        };
        println!(
            "  {} [{}] {:8} {}  {}",
            track.id.display_number(),
            track.letter,
            track.name,
            track.color,
            marker
        );
    }
    println!();
}

fn print_help() {
    println!("commands: p=play/pause  r=reset  m <n>=mute  v <n> <vol>  s=status  b=bands  q=quit");
}

fn print_status(session: &Session) {
    println!(
        "state: {:?}  loaded: {}  progress: {}%",
        session.state(),
        session.is_loaded(),
        session.loading_progress()
    );
    for track in TRACKS.iter() {
        let mix = session.mix_state(track.id);
        println!(
            "  {} {:8} vol {:.2}{}{}",
            track.id.display_number(),
            track.name,
            mix.volume,
            if mix.muted { "  [muted]" } else { "" },
            if session.track_has_loop(track.id) {
                ""
            } else {
                "  [no loop]"
            }
        );
    }
}

fn print_bands(session: &Session) {
    const GLYPHS: [char; 8] = [' ', '.', ':', '-', '=', '+', '*', '#'];
    let viz = session.visualization();
    for (track, bands) in TRACKS.iter().zip(viz.tracks.iter()) {
        let bar: String = bands
            .bands
            .iter()
            .map(|b| {
                let level = (b.height * (GLYPHS.len() - 1) as f32).round() as usize;
                GLYPHS[level.min(GLYPHS.len() - 1)]
            })
            .collect();
        println!("  {:8} |{}|", track.name, bar);
    }
    println!("  redraw generation: {}", session.redraw_generation());
}
