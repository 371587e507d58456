use midisynth::generator::{PercussionVoice, SynthConfig, Synthesizer, PERCUSSION_CHANNEL};
use midisynth::pipeline::{Channel, CHANNEL_COUNT};
use plotters::prelude::*;

const VELOCITY: u8 = 127;
/// Extra silence plotted after the hit
const TAIL_SAMPLES: usize = 500;

struct Args {
    key: u8,
    output_path: String,
}

fn print_usage() {
    eprintln!("Usage: plot-drum <key> <output.svg>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  plot-drum 36 kick.svg    # bass drum");
    eprintln!("  plot-drum 42 hihat.svg   # closed hihat");
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 3 {
        print_usage();
        return Err("Invalid number of arguments".into());
    }

    let key: u8 = args[1].parse()?;
    if PercussionVoice::for_key(key).is_none() {
        return Err(format!("Key {} has no percussion voice", key).into());
    }

    Ok(Args {
        key,
        output_path: args[2].clone(),
    })
}

fn render_hit(key: u8, config: SynthConfig) -> Vec<f32> {
    let total = usize::from(config.percussion_duration) + TAIL_SAMPLES;
    let mut synth = Synthesizer::new(config);
    let mut channels: [Channel; CHANNEL_COUNT] = std::array::from_fn(|_| Channel::new());

    channels[PERCUSSION_CHANNEL].note_on(key, VELOCITY);
    channels[PERCUSSION_CHANNEL].update();

    let mut buffer = vec![0i16; total];
    synth.render_into(&channels, &mut buffer);

    buffer
        .iter()
        .map(|&s| f32::from(s) / f32::from(i16::MAX))
        .collect()
}

fn create_plot(args: &Args, samples: &[f32], sample_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(&args.output_path, (800, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let ms_per_sample = 1000.0 / sample_rate as f32;
    let max_time = samples.len() as f32 * ms_per_sample;

    let title = format!("{:?} (key {})", PercussionVoice::for_key(args.key), args.key);

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f32..max_time, -1.1f32..1.1f32)?;

    chart
        .configure_mesh()
        .x_desc("Time (ms)")
        .y_desc("Amplitude")
        .x_labels(10)
        .y_labels(10)
        .draw()?;

    chart.draw_series(LineSeries::new(
        samples
            .iter()
            .enumerate()
            .map(|(i, &s)| (i as f32 * ms_per_sample, s)),
        BLUE.stroke_width(1),
    ))?;

    root.present()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = SynthConfig::default();
    let sample_rate = config.sample_rate;

    println!("Percussion Plot Generator");
    println!("=========================");
    println!("  Key: {}", args.key);
    println!("  Duration: {} samples", config.percussion_duration);
    println!();

    print!("  Rendering hit... ");
    let samples = render_hit(args.key, config);
    let peak = samples.iter().fold(0f32, |peak, s| peak.max(s.abs()));
    println!("done ({} samples, peak {:.3})", samples.len(), peak);

    print!("  Creating plot... ");
    create_plot(&args, &samples, sample_rate)?;
    println!("done");

    println!();
    println!("Output: {}", args.output_path);

    Ok(())
}
