// Bassline command line interface

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bassline_lib::pitch::ConfidenceThreshold;
use bassline_lib::separation::create_separator;
use bassline_lib::{extract_all_bass_lines, BassLineExtractor, ExtractionConfig, ExtractionError, TrackCatalog};

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract the chorus bass line of songs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, global = true, default_value = "output")]
    out: PathBuf,

    /// Chorus length in bars
    #[arg(long, global = true)]
    n_bars: Option<usize>,

    /// Beats the chorus start may move to reach a bar line
    #[arg(long, global = true)]
    epsilon: Option<usize>,

    /// Skip F0 estimation of the bass line
    #[arg(long, global = true)]
    no_pitch: bool,

    /// F0 confidence threshold: none, mean, mean_reduced or a value in (0, 1)
    #[arg(long, global = true)]
    threshold: Option<ConfidenceThreshold>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every mp3/wav file of a directory, BPMs from a metadata file
    Batch {
        audio_dir: PathBuf,
        metadata: PathBuf,
    },
    /// Process a single file
    Track {
        path: PathBuf,
        /// Tempo of the track; estimated from the audio when omitted
        #[arg(long)]
        bpm: Option<f64>,
    },
}

fn build_config(cli: &Cli) -> Result<ExtractionConfig, ExtractionError> {
    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_file(path)?,
        None => ExtractionConfig::default(),
    };

    if let Some(n_bars) = cli.n_bars {
        config.chorus.n_bars = n_bars;
    }
    if let Some(epsilon) = cli.epsilon {
        config.chorus.epsilon = epsilon;
    }
    if let Some(threshold) = cli.threshold {
        config.pitch.threshold = threshold;
    }
    if cli.no_pitch {
        config.estimate_pitch = false;
    }

    Ok(config)
}

fn run(cli: &Cli) -> Result<(), ExtractionError> {
    let config = build_config(cli)?;

    match &cli.command {
        Command::Batch { audio_dir, metadata } => {
            let catalog = TrackCatalog::load(metadata)?;
            let report = extract_all_bass_lines(audio_dir, &catalog, &config, &cli.out)?;
            for failure in &report.failures {
                log::warn!("{} failed ({}): {}", failure.title, failure.kind, failure.message);
            }
        }
        Command::Track { path, bpm } => {
            let separator = create_separator(&config.separation)?;
            let summary = BassLineExtractor::new(path, *bpm, separator.as_ref(), &config, &cli.out).extract()?;
            log::info!(
                "Chorus of {} starts at beat {} ({:.2}s), written to {}",
                summary.title,
                summary.chorus_start_beat_idx,
                summary.chorus_start_secs,
                Path::new(&cli.out).join(&summary.title).display()
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
