use clap::Parser;
use std::path::{Path, PathBuf};
use sukashi::config::{OutputFormat, ProcessingConfig};
use sukashi::pipeline::{derive_output_path, Job, Pipeline};
use walkdir::WalkDir;

/// File suffixes the pipeline accepts as input.
const SUPPORTED_SUFFIXES: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp", "gif", "pdf",
];

/// Sukashi - batch image watermarking and web optimization
#[derive(Parser, Debug)]
#[command(name = "sukashi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input file or folder
    #[arg(short, long)]
    input: PathBuf,

    /// Output folder (default: "web" subfolder next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quality override for JPEG/WebP output (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Format override: jpeg, png or webp
    #[arg(long)]
    format: Option<String>,

    /// Long-edge pixel target override
    #[arg(long)]
    long_edge: Option<u32>,

    /// Process files one at a time instead of using the worker pool
    #[arg(long)]
    sequential: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging subsystem
    sukashi::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProcessingConfig::load_from_file(path)?,
        None => ProcessingConfig::default(),
    };

    if let Some(quality) = args.quality {
        config.jpeg_quality = quality;
        config.webp_quality = quality as f32;
    }
    if let Some(format) = &args.format {
        config.output_format = format.parse::<OutputFormat>()?;
    }
    if let Some(long_edge) = args.long_edge {
        config.long_edge = long_edge;
    }
    if args.sequential {
        config.parallel = false;
    }

    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| sibling_output_dir(&args.input));

    let jobs = enumerate_jobs(&args.input, &output_dir, &config)?;
    if jobs.is_empty() {
        tracing::warn!(input = %args.input.display(), "No supported image files found");
        println!("No supported image files found");
        return Ok(());
    }

    tracing::info!(
        input = %args.input.display(),
        output = %output_dir.display(),
        files = jobs.len(),
        format = config.output_format.as_str(),
        parallel = config.parallel,
        "Starting batch"
    );

    let pipeline = Pipeline::new(config)?;
    let report = pipeline.process_batch(&jobs, |current, total| {
        tracing::info!(current = current, total = total, "Progress");
        true
    });

    println!("Processing complete:");
    println!("  Processed: {}", report.processed);
    println!("  Failed:    {}", report.failed);
    println!("  Total:     {}", report.total);
    if report.stopped {
        println!("  Stopped early");
    }

    if report.processed == 0 && report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn sibling_output_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.join("web")
    } else {
        input
            .parent()
            .map(|p| p.join("web"))
            .unwrap_or_else(|| PathBuf::from("web"))
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_SUFFIXES.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Enumerate `(input, output)` pairs: recursive walk, supported suffixes
/// only, the output folder excluded, files already carrying the output
/// suffix skipped, sorted for deterministic ordering.
fn enumerate_jobs(
    input: &Path,
    output_dir: &Path,
    config: &ProcessingConfig,
) -> anyhow::Result<Vec<Job>> {
    if input.is_file() {
        return Ok(vec![(
            input.to_path_buf(),
            derive_output_path(input, output_dir, config),
        )]);
    }

    let mut inputs: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path))
        .filter(|path| !path.starts_with(output_dir))
        .filter(|path| {
            // Dedup by suffix: derivatives of an earlier run are not inputs
            let already_processed = !config.output_suffix.is_empty()
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.ends_with(config.output_suffix.as_str()))
                    .unwrap_or(false);
            !already_processed
        })
        .collect();
    inputs.sort();

    Ok(inputs
        .into_iter()
        .map(|path| {
            let output = derive_output_path(&path, output_dir, config);
            (path, output)
        })
        .collect())
}
