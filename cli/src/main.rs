//! `celltrack` CLI: watershed merging and track linking from the command
//! line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linker_core::{viterbi_track_linking, LinkProblem, LinkerConfig};
use std::path::PathBuf;
use watershed_core::merge_segments;

#[derive(Parser)]
#[command(name = "celltrack", about = "Cell segmentation merging and track linking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge weakly separated watershed regions in a label image.
    Merge {
        /// Label image (length-prefixed binary, i32, 0 = ridge)
        #[arg(long)]
        labels: PathBuf,
        /// Intensity image (length-prefixed binary, f64, same shape)
        #[arg(long)]
        image: PathBuf,
        /// Output path for the merged label image
        #[arg(long)]
        output: PathBuf,
        /// Score threshold below which region pairs are merged
        #[arg(long, default_value_t = 0.9)]
        threshold: f64,
        /// Regions with at most this many pixels merge regardless of score
        #[arg(long, default_value_t = 0)]
        min_size: usize,
    },
    /// Link per-frame detections into cell tracks.
    Track {
        /// Linking problem (JSON: detections per frame + score tables)
        problem: PathBuf,
        /// Output path for the result matrices (JSON)
        #[arg(long)]
        output: PathBuf,
        /// Directory for per-iteration snapshot files
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// Write the structured event records to this JSON file
        #[arg(long)]
        record_log: Option<PathBuf>,
        /// Separate born-later and dead idle states per frame
        #[arg(long)]
        split_idle: bool,
        /// Cap on the score gain of a single migration
        #[arg(long, default_value_t = f64::INFINITY)]
        max_migration_score: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            labels,
            image,
            output,
            threshold,
            min_size,
        } => run_merge(&labels, &image, &output, threshold, min_size),
        Commands::Track {
            problem,
            output,
            snapshot_dir,
            record_log,
            split_idle,
            max_migration_score,
        } => run_track(
            &problem,
            &output,
            snapshot_dir,
            record_log.as_deref(),
            split_idle,
            max_migration_score,
        ),
    }
}

fn run_merge(
    labels_path: &std::path::Path,
    image_path: &std::path::Path,
    output: &std::path::Path,
    threshold: f64,
    min_size: usize,
) -> Result<()> {
    let labels = array_io::load_i32(labels_path)
        .with_context(|| format!("reading labels from {}", labels_path.display()))?;
    let image = array_io::load_f64(image_path)
        .with_context(|| format!("reading image from {}", image_path.display()))?;

    let start = std::time::Instant::now();
    let merged = merge_segments(labels.dims(), labels.data(), image.data(), threshold, min_size)?;
    let elapsed = start.elapsed();

    let regions_in = labels.data().iter().copied().max().unwrap_or(0);
    let regions_out = merged.iter().copied().max().unwrap_or(0);
    println!(
        "Merged {} regions into {} (threshold={}, min_size={}, elapsed={:.3}s)",
        regions_in,
        regions_out,
        threshold,
        min_size,
        elapsed.as_secs_f64()
    );

    let out_array = array_io::Array::from_vec(labels.dims().to_vec(), merged);
    array_io::save_i32(output, &out_array)
        .with_context(|| format!("writing merged labels to {}", output.display()))?;
    println!("Merged labels saved to {}", output.display());
    Ok(())
}

fn run_track(
    problem_path: &std::path::Path,
    output: &std::path::Path,
    snapshot_dir: Option<PathBuf>,
    record_log: Option<&std::path::Path>,
    split_idle: bool,
    max_migration_score: f64,
) -> Result<()> {
    let problem_json = std::fs::read_to_string(problem_path)
        .with_context(|| format!("reading problem from {}", problem_path.display()))?;
    let problem: LinkProblem =
        serde_json::from_str(&problem_json).context("parsing the linking problem")?;

    if let Some(dir) = &snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
    }

    let config = LinkerConfig {
        single_idle_state: !split_idle,
        max_migration_score,
        collect_records: record_log.is_some(),
        snapshot_dir,
    };

    tracing::info!(
        frames = problem.detections_per_frame.len(),
        detections = problem.detections_per_frame.iter().sum::<usize>(),
        "linking tracks"
    );

    let start = std::time::Instant::now();
    let result = viterbi_track_linking(&problem, config)?;
    let elapsed = start.elapsed();

    let divisions = result
        .division_matrix
        .iter()
        .filter(|d| d[0] != 0)
        .count();
    let deaths = result.death_matrix.iter().filter(|&&d| d).count();
    println!(
        "Linked {} tracks in {} iterations ({} divisions, {} deaths, elapsed={:.3}s)",
        result.cell_matrix.len(),
        result.iterations,
        divisions,
        deaths,
        elapsed.as_secs_f64()
    );

    if let Some(log_path) = record_log {
        std::fs::write(log_path, serde_json::to_string_pretty(&result.records)?)
            .with_context(|| format!("writing records to {}", log_path.display()))?;
        println!("Event records saved to {}", log_path.display());
    }

    std::fs::write(output, serde_json::to_string_pretty(&result)?)
        .with_context(|| format!("writing result to {}", output.display()))?;
    println!("Result saved to {}", output.display());
    Ok(())
}
