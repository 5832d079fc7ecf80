//! trajmode CLI - Batch preparation of Geolife trajectories
//!
//! Usage:
//!   trajmode-cli segment <input> --segments <dir>
//!   trajmode-cli features --segments <dir> --features <dir> [--annotated <dir>]
//!   trajmode-cli run <input> --segments <dir> --features <dir> [--annotated <dir>]
//!
//! `<input>` holds one directory per subject, each with a `labels.txt` and a
//! `Trajectory/` folder of cleaned trajectory files.

use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use trajmode::{PipelineConfig, PipelineReport, SegmenterConfig, Stage, run_pipeline};

#[derive(Parser)]
#[command(name = "trajmode-cli")]
#[command(about = "Segment labelled GPS trajectories and extract mode features", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split trajectories into one file per labelled interval
    Segment {
        /// Folder containing one directory per subject
        input: PathBuf,

        #[command(flatten)]
        options: SegmentOptions,
    },

    /// Compute feature vectors for previously written segments
    Features {
        /// Folder holding one segment directory per subject
        #[arg(long)]
        segments: PathBuf,

        /// Output folder for feature vectors
        #[arg(long)]
        features: PathBuf,

        /// Also write per-point kinematic tables here
        #[arg(long)]
        annotated: Option<PathBuf>,

        #[command(flatten)]
        common: CommonOptions,
    },

    /// Segment and extract features in one pass
    Run {
        /// Folder containing one directory per subject
        input: PathBuf,

        #[command(flatten)]
        options: SegmentOptions,

        /// Output folder for feature vectors
        #[arg(long)]
        features: PathBuf,

        /// Also write per-point kinematic tables here
        #[arg(long)]
        annotated: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SegmentOptions {
    /// Output folder for segment files
    #[arg(long)]
    segments: PathBuf,

    /// Minimum points per emitted segment
    #[arg(long, default_value = "2")]
    min_points: usize,

    /// Segment unsorted labels and points instead of rejecting them
    #[arg(long)]
    no_validate: bool,

    #[command(flatten)]
    common: CommonOptions,
}

#[derive(Args)]
struct CommonOptions {
    /// Only process these subject ids (repeatable)
    #[arg(short, long = "subject")]
    subjects: Vec<String>,

    /// Skip writing the run report
    #[arg(long)]
    no_report: bool,
}

impl SegmentOptions {
    fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            min_segment_points: self.min_points,
            validate_ordering: !self.no_validate,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let (config, stage) = match cli.command {
        Commands::Segment { input, options } => {
            let mut config = PipelineConfig {
                input_dir: input,
                segment_dir: options.segments.clone(),
                segmenter: options.segmenter(),
                ..PipelineConfig::default()
            };
            apply_common(&mut config, options.common);
            (config, Stage::Segment)
        }
        Commands::Features {
            segments,
            features,
            annotated,
            common,
        } => {
            let mut config = PipelineConfig {
                segment_dir: segments,
                feature_dir: features,
                annotated_dir: annotated,
                ..PipelineConfig::default()
            };
            apply_common(&mut config, common);
            (config, Stage::Features)
        }
        Commands::Run {
            input,
            options,
            features,
            annotated,
        } => {
            let mut config = PipelineConfig {
                input_dir: input,
                segment_dir: options.segments.clone(),
                feature_dir: features,
                annotated_dir: annotated,
                segmenter: options.segmenter(),
                ..PipelineConfig::default()
            };
            apply_common(&mut config, options.common);
            (config, Stage::All)
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("{:?} stage", stage);
    println!("{}", "=".repeat(60));

    match run_pipeline(&config, stage) {
        Ok(report) => {
            print_report(&report, cli.verbose);
            if report.failed_subjects().is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn apply_common(config: &mut PipelineConfig, common: CommonOptions) {
    config.subjects = common.subjects;
    config.write_report = !common.no_report;
}

fn print_report(report: &PipelineReport, verbose: bool) {
    println!("\n{}", "=".repeat(60));
    println!("RESULTS");
    println!("{}", "=".repeat(60));

    for subject in &report.subjects {
        match &subject.error {
            Some(error) => println!("  [ERR] {} - {}", subject.subject, error),
            None => {
                let stats = &subject.segmentation;
                println!(
                    "  [OK] {} - {} segments, {} features, {} skipped",
                    subject.subject,
                    subject.segments_written,
                    subject.features_written,
                    subject.feature_failures.len()
                );
                if stats.intervals_total > 0 {
                    println!(
                        "       labels: {} matched, {} empty, {} unmatched of {}",
                        stats.intervals_matched,
                        stats.intervals_empty,
                        stats.intervals_unmatched,
                        stats.intervals_total
                    );
                }
            }
        }

        if verbose {
            for extent in &subject.segments {
                println!(
                    "       {} - {} points, lat {:.5}..{:.5}, lng {:.5}..{:.5}",
                    extent.segment_id,
                    extent.point_count,
                    extent.min_lat,
                    extent.max_lat,
                    extent.min_lng,
                    extent.max_lng
                );
            }
            for failure in &subject.feature_failures {
                println!("       [SKIP] {} - {}", failure.segment_id, failure.reason);
            }
        }
    }

    println!(
        "\nTotal: {} segments, {} feature vectors, {} failed subjects",
        report.total_segments(),
        report.total_features(),
        report.failed_subjects().len()
    );
}
