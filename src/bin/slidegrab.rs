use clap::Parser;
use log::error;
use slide_lib::api::slides::{SlideExtractor, ToolPaths};
use slide_lib::core::slides::PipelineConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Extract de-duplicated slides and their text from a presentation video
#[derive(Parser, Debug)]
#[command(name = "slidegrab", version)]
struct Cli {
    /// Local video file, or a directory of frame images
    location: String,

    /// Output directory for slide images, slides.json and slides.md
    #[arg(short, long, default_value = "slides")]
    out: PathBuf,

    /// JSON pipeline config; explicit flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample every Nth decoded frame
    #[arg(short, long)]
    interval: Option<u32>,

    /// Hamming distance a frame must exceed to count as a new slide
    #[arg(short, long)]
    threshold: Option<u32>,

    /// Concurrent text extraction workers
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    /// Tesseract language code
    #[arg(long, default_value = "eng")]
    lang: String,
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, slide_lib::core::slides::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(interval) = cli.interval {
        config.interval = interval;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(workers) = cli.workers {
        config.extraction_workers = workers;
    }
    Ok(config)
}

fn main() -> ExitCode {
    slide_lib::init_logging();
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::from(2);
        }
    };
    let tools = ToolPaths {
        ffmpeg: cli.ffmpeg.clone(),
        tesseract: cli.tesseract.clone(),
        language: cli.lang.clone(),
    };

    let extractor = match SlideExtractor::create(config, tools) {
        Ok(extractor) => extractor,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::from(2);
        }
    };

    match extractor.extract(&cli.location, &cli.out) {
        Ok(report) => {
            for record in &report.records {
                println!("frame {:>8}  {} chars", record.order, record.text.chars().count());
            }
            if let Some(path) = &report.document.path {
                println!("{} slides → {}", report.records.len(), path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
