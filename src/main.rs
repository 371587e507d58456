//! CLI for playing, rendering and inspecting MIDI files
//!
//! Usage: midisynth <play|dump|render> <file.mid> [output.wav]

use std::env;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

use midisynth::generator::{SynthConfig, Synthesizer};
use midisynth::pipeline::dump::dump_tracks;
use midisynth::pipeline::{Player, PlayerConfig};
use midisynth::sink::{RawPcmSink, Renderer};
use midisynth::wav::WavSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: midisynth <play|dump|render> <file.mid> [output.wav]

Actions:
  play      Stream 16-bit stereo PCM at 44100 Hz to stdout
  dump      List every track's events
  render    Write a mono WAV file (defaults to <file>.wav)

Examples:
  midisynth play song.mid | aplay -f cd
  midisynth render song.mid song.wav
  RUST_LOG=debug midisynth dump song.mid
";

enum Action {
    Play,
    Dump,
    Render(PathBuf),
}

fn parse_args() -> Option<(Action, PathBuf)> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        return None;
    }

    let input = PathBuf::from(&args[2]);
    let action = match args[1].as_str() {
        "play" => Action::Play,
        "dump" => Action::Dump,
        "render" => {
            let output = args
                .get(3)
                .map(PathBuf::from)
                .unwrap_or_else(|| input.with_extension("wav"));
            Action::Render(output)
        }
        _ => return None,
    };

    Some((action, input))
}

fn run(action: Action, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(input).map_err(|e| format!("reading {}: {}", input.display(), e))?;
    let file = midisynth::parse(&bytes)?;

    match action {
        Action::Dump => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            dump_tracks(&file, &mut out)?;
        }
        Action::Play => {
            let mut player = Player::new(&file, PlayerConfig::default())?;
            let synth = Synthesizer::new(SynthConfig::default());
            let sink = RawPcmSink::stereo(io::stdout().lock());
            let mut renderer = Renderer::new(synth, sink).with_stop_handle(player.stop_handle());

            player.play(&mut renderer)?;
            renderer.finish()?;
        }
        Action::Render(output) => {
            let config = SynthConfig::default();
            let sink = WavSink::create(&output, config.sample_rate)?;
            let mut player = Player::new(&file, PlayerConfig::default())?;
            let mut renderer = Renderer::new(Synthesizer::new(config), sink);

            player.play(&mut renderer)?;
            let samples = renderer.samples_rendered();
            renderer.finish()?;

            info!(samples, output = %output.display(), "render complete");
            eprintln!("Wrote {}", output.display());
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let Some((action, input)) = parse_args() else {
        eprintln!("{}", USAGE);
        process::exit(1);
    };

    if let Err(e) = run(action, &input) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
