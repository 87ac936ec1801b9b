//! midimix - Play a Standard MIDI File through the mixer.
//!
//! Loads a file, routes every track to the opened outputs on its own channel
//! and plays it in real time through a SoundFont synthesizer.
//!
//! # Usage
//!
//! ```bash
//! midimix song.mid --soundfont piano.sf2
//! midimix song.mid --dry-run              # play into an in-memory recorder
//! midimix song.mid --export copy.mid      # re-encode without playing
//! ```

use anyhow::{bail, Context, Result};
use midimix::midi::{note_to_name, write_sequence_file};
use midimix::output::{RecordingOutput, SynthEngine};
use midimix::{EngineConfig, EngineContext, OutputTarget, PlaybackEvent, PlaybackScheduler};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line options for the application.
struct CliOptions {
    /// MIDI file to load.
    input: PathBuf,
    /// SoundFont for the built-in synthesizer.
    soundfont: Option<PathBuf>,
    /// JSON engine configuration.
    config: Option<PathBuf>,
    /// Play into a recorder instead of an audio device.
    dry_run: bool,
    /// Write the loaded sequence back out and exit.
    export: Option<PathBuf>,
}

fn print_help(program: &str) {
    eprintln!("midimix - MIDI file player and mixer");
    eprintln!();
    eprintln!("Usage: {program} <FILE.mid> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -sf, --soundfont PATH  SoundFont file (.sf2) used for playback");
    eprintln!("  -c, --config PATH      Engine configuration (JSON)");
    eprintln!("  -n, --dry-run          Play into an in-memory recorder");
    eprintln!("  -e, --export PATH      Re-encode the loaded file and exit");
    eprintln!("  -h, --help             Print this help message");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG, e.g. RUST_LOG=midimix=debug.");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("midimix");
        let mut input = None;
        let mut soundfont = None;
        let mut config = None;
        let mut export = None;
        let mut dry_run = false;
        let mut i = 1;

        let value = |i: usize, flag: &str| -> Result<PathBuf> {
            match args.get(i) {
                Some(v) => Ok(PathBuf::from(v)),
                None => bail!("{flag} requires a path argument"),
            }
        };

        while i < args.len() {
            match args[i].as_str() {
                "--soundfont" | "-sf" => {
                    i += 1;
                    soundfont = Some(value(i, "--soundfont")?);
                }
                "--config" | "-c" => {
                    i += 1;
                    config = Some(value(i, "--config")?);
                }
                "--export" | "-e" => {
                    i += 1;
                    export = Some(value(i, "--export")?);
                }
                "--dry-run" | "-n" => dry_run = true,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.ends_with(".sf2") => soundfont = Some(PathBuf::from(other)),
                other if other.starts_with('-') => {
                    bail!("unknown option: {other} (use --help for usage information)")
                }
                other => input = Some(PathBuf::from(other)),
            }
            i += 1;
        }

        let Some(input) = input else {
            print_help(program);
            bail!("no MIDI file given");
        };
        Ok(Self {
            input,
            soundfont,
            config,
            dry_run,
            export,
        })
    }
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let ctx = EngineContext::new(config);
    ctx.load_file(&cli.input)
        .with_context(|| format!("Failed to load MIDI file: {}", cli.input.display()))?;

    print_summary(&ctx);

    if let Some(path) = &cli.export {
        let written = ctx
            .with_sequence(|s| write_sequence_file(s, path))
            .context("No sequence loaded")?;
        written.with_context(|| format!("Failed to write MIDI file: {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    // Kept alive for the duration of playback.
    let mut _engine = None;
    let recorder = RecordingOutput::new("dry-run");
    if cli.dry_run {
        ctx.router().open_output(recorder.clone());
    } else {
        let Some(soundfont) = &cli.soundfont else {
            bail!("--soundfont is required unless --dry-run is given");
        };
        let engine = SynthEngine::new(soundfont).context("Failed to initialize synthesizer")?;
        ctx.router().open_output(engine.output());
        _engine = Some(engine);
    }
    ctx.router().route_all_tracks(OutputTarget::AllOutputs);

    let scheduler = PlaybackScheduler::new(ctx.clone());
    let (_, events) = scheduler.subscribe();
    scheduler.play().context("Failed to start playback")?;

    let total = ctx.with_sequence(|s| s.max_tick()).unwrap_or(0);
    loop {
        match events.recv_timeout(Duration::from_secs(1)) {
            Ok(PlaybackEvent::Finished { .. }) => break,
            Ok(PlaybackEvent::Stopped { tick }) => {
                tracing::warn!(tick, "playback stopped early");
                break;
            }
            Ok(_) => {}
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                tracing::debug!(position = scheduler.position(), total, "playing");
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    if cli.dry_run {
        println!(
            "Dry run: {} note-ons, {} note-offs",
            recorder.note_on_count(),
            recorder.note_off_count()
        );
    } else {
        // Let release tails ring out
        std::thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}

fn print_summary(ctx: &EngineContext) {
    ctx.with_sequence(|sequence| {
        println!(
            "{} tracks, {} PPQ, {:.1} BPM, {:.1} s",
            sequence.track_count(),
            sequence.ppq(),
            sequence.bpm(),
            sequence.duration_ms() / 1000.0
        );
        for track in sequence.tracks() {
            let range = track
                .notes()
                .iter()
                .map(|n| n.pitch)
                .fold(None, |acc: Option<(u8, u8)>, p| match acc {
                    None => Some((p, p)),
                    Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
                })
                .map(|(lo, hi)| format!("{}-{}", note_to_name(lo), note_to_name(hi)))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<24} ch {:>2}  {:>5} notes  {}",
                track.name,
                track.channel.map_or("-".to_string(), |c| (c + 1).to_string()),
                track.note_count(),
                range
            );
        }
    });
}
