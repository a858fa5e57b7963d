use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voxmorph_core::constants::{
    DEFAULT_FRAMES_PER_BUFFER, DRAIN_TIMEOUT_MS, HIGHPASS_CUTOFF_HZ, MAX_RECORDED_QUEUE_SIZE,
};
use voxmorph_core::{
    stop_signal, FrameConverter, Pipeline, PipelineConfig, VocoderAnalyzer, VocoderSynthesizer,
};

mod artifacts;
mod audio;
mod config;
mod paths;
mod prompt;

use audio::AudioSystem;
use config::{PairConfig, SpeakerConfig};
use paths::DataLayout;

#[derive(Parser)]
#[command(name = "voxmorph")]
#[command(about = "Voxmorph: real-time voice conversion", long_about = None)]
struct Cli {
    /// Speaker whose voice is captured
    #[arg(required_unless_present = "list_devices")]
    source: Option<String>,
    /// Speaker whose voice is played back
    #[arg(required_unless_present = "list_devices")]
    target: Option<String>,
    /// Input device index (prompted if omitted)
    #[arg(short, long)]
    input: Option<usize>,
    /// Output device index (prompted if omitted)
    #[arg(short, long)]
    output: Option<usize>,
    /// Frequency warping coefficient, overriding the speaker config
    #[arg(long)]
    alpha: Option<f64>,
    /// Samples per captured frame
    #[arg(long, default_value_t = DEFAULT_FRAMES_PER_BUFFER)]
    frames: usize,
    /// Root of the conf/ and data/ trees
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Captured frames kept waiting before the oldest are dropped
    #[arg(long, default_value_t = MAX_RECORDED_QUEUE_SIZE)]
    max_recorded: usize,
    /// Cap on extracted features waiting for conversion
    #[arg(long)]
    feature_queue_cap: Option<usize>,
    /// Cap on converted frames waiting for playback
    #[arg(long)]
    converted_queue_cap: Option<usize>,
    /// High-pass cutoff applied to captured audio, in Hz
    #[arg(long, default_value_t = HIGHPASS_CUTOFF_HZ)]
    highpass_cutoff: f64,
    /// List available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let audio = AudioSystem::new();

    if cli.list_devices {
        return list_devices(&audio);
    }
    let (Some(source), Some(target)) = (cli.source.as_deref(), cli.target.as_deref()) else {
        bail!("both a source and a target speaker are required");
    };
    if cli.frames == 0 {
        bail!("--frames must be positive");
    }
    if cli.max_recorded == 0 {
        bail!("--max-recorded must be positive");
    }

    let layout = DataLayout::new(cli.data_dir.clone().unwrap_or_else(DataLayout::default_root));
    info!("Data directory: {}", layout.root().display());

    let speaker = SpeakerConfig::load(&layout.speaker_config(source))?;
    let pair = PairConfig::load(&layout.pair_config(source, target))?;
    let alpha = cli.alpha.unwrap_or(speaker.mcep_alpha);
    let models = Arc::new(artifacts::load_models(&layout, source, target, &speaker, &pair, alpha)?);

    // Analysis and synthesis warp with the same coefficient the models were loaded for.
    let analyzer = VocoderAnalyzer::new(speaker.analysis_config(Some(models.alpha())))
        .context("invalid analysis settings")?;
    let synthesizer = VocoderSynthesizer::new(speaker.synthesis_config(Some(models.alpha())))
        .context("invalid synthesis settings")?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let input_index = match cli.input {
        Some(index) => index,
        None => prompt::choose_device("input", &audio.input_devices()?, &mut input, &mut output)?,
    };
    let output_index = match cli.output {
        Some(index) => index,
        None => prompt::choose_device("output", &audio.output_devices()?, &mut input, &mut output)?,
    };

    let (stop_handle, stop) = stop_signal();
    let interrupt = stop_handle.clone();
    ctrlc::set_handler(move || {
        println!("\nShutting down gracefully...");
        interrupt.trigger();
    })
    .context("failed to install the Ctrl+C handler")?;

    let microphone = audio.open_microphone(
        input_index,
        speaker.sample_rate,
        cli.frames,
        cli.highpass_cutoff,
        stop.clone(),
    )?;
    let speaker_out = audio.open_speaker(output_index, speaker.sample_rate, cli.frames)?;

    let config = PipelineConfig {
        max_recorded: cli.max_recorded,
        feature_queue_cap: cli.feature_queue_cap,
        converted_queue_cap: cli.converted_queue_cap,
        drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
    };
    let mut pipeline = Pipeline::with_stop_signal(config, microphone, speaker_out, stop_handle, stop);

    println!("Voxmorph active ({source} -> {target}). Press Ctrl+C to stop.");
    let summary = pipeline.run(analyzer, FrameConverter::new(models, synthesizer))?;
    println!("Voxmorph stopped: {summary}.");
    Ok(())
}

fn list_devices(audio: &AudioSystem) -> Result<()> {
    println!("Audio Host: {}", audio.host_name());
    println!("\nInput Devices:");
    for (index, name) in audio.input_devices()? {
        println!("  {index:03} : {name}");
    }
    println!("\nOutput Devices:");
    for (index, name) in audio.output_devices()? {
        println!("  {index:03} : {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["voxmorph", "alice", "bob"]).unwrap();
        assert_eq!(cli.source.as_deref(), Some("alice"));
        assert_eq!(cli.target.as_deref(), Some("bob"));
        assert_eq!(cli.frames, DEFAULT_FRAMES_PER_BUFFER);
        assert_eq!(cli.max_recorded, MAX_RECORDED_QUEUE_SIZE);
        assert_eq!(cli.highpass_cutoff, HIGHPASS_CUTOFF_HZ);
        assert!(cli.input.is_none() && cli.output.is_none());
        assert!(cli.feature_queue_cap.is_none() && cli.converted_queue_cap.is_none());
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from([
            "voxmorph", "alice", "bob", "-i", "2", "-o", "0", "--alpha", "0.455", "--frames",
            "4096", "--converted-queue-cap", "4",
        ])
        .unwrap();
        assert_eq!(cli.input, Some(2));
        assert_eq!(cli.output, Some(0));
        assert_eq!(cli.alpha, Some(0.455));
        assert_eq!(cli.frames, 4096);
        assert_eq!(cli.converted_queue_cap, Some(4));
    }

    #[test]
    fn test_cli_requires_speakers() {
        assert!(Cli::try_parse_from(["voxmorph", "alice"]).is_err());
        assert!(Cli::try_parse_from(["voxmorph", "--list-devices"]).is_ok());
    }
}
