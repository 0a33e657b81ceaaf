//! Chapmark Command Line Interface
//!
//! Embeds Audacity chapter markers into audio files and exports them as
//! M4A and MP3, with optional two-pass loudness normalization.

use chapmark::loudness::{DEFAULT_TARGET_LUFS, FfmpegLoudnessFilter, LoudnessTargets, NormalizationMode};
use chapmark::pipeline::{ChapterPipeline, PipelineOptions};
use chapmark::probe::FfprobeProber;
use chapmark::transcode::{FfmpegTranscoder, OutputFormat};
use clap::Parser;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chapmark")]
#[command(about = "Embed Audacity chapter markers into M4A and MP3 audio", long_about = None)]
#[command(version)]
struct Cli {
    /// Input audio file
    #[arg(value_name = "AUDIO")]
    audio_file: PathBuf,

    /// Audacity label file (.txt)
    #[arg(value_name = "LABELS")]
    label_file: PathBuf,

    /// Output directory (default: same directory as the input file)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Export only the M4A variant
    #[arg(long, conflicts_with = "mp3_only")]
    m4a_only: bool,

    /// Export only the MP3 variant
    #[arg(long)]
    mp3_only: bool,

    /// Loudness-normalize the audio while transcoding
    #[arg(long)]
    normalize: bool,

    /// Integrated loudness target in LUFS
    #[arg(long, value_name = "LUFS", default_value_t = DEFAULT_TARGET_LUFS)]
    target_lufs: f64,

    /// Write a Nero chapter XML sidecar next to the M4A output
    #[arg(long)]
    chapter_xml: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    info!("chapmark {}", chapmark::VERSION);

    let formats = if cli.m4a_only {
        vec![OutputFormat::M4a]
    } else if cli.mp3_only {
        vec![OutputFormat::Mp3]
    } else {
        vec![OutputFormat::M4a, OutputFormat::Mp3]
    };

    let options = PipelineOptions {
        output_dir: cli.output_dir,
        formats,
        normalize: cli.normalize,
        targets: LoudnessTargets::with_integrated(cli.target_lufs),
        nero_sidecar: cli.chapter_xml,
    };

    let prober = FfprobeProber::new();
    let loudness = FfmpegLoudnessFilter::new();
    let transcoder = FfmpegTranscoder::new();
    let pipeline = ChapterPipeline::new(&prober, &loudness, &transcoder);

    match pipeline.run(&cli.audio_file, &cli.label_file, &options) {
        Ok(report) => {
            for output in &report.outputs {
                println!("wrote {}", output.display());
            }
            match report.normalization {
                NormalizationMode::Linear => info!("loudness normalized (two-pass linear)"),
                NormalizationMode::Dynamic => info!("loudness normalized (single-pass dynamic)"),
                NormalizationMode::Skipped => {}
            }
            println!("embedded {} chapters", report.chapter_count);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
