//! binacoco: converts zipped annotation datasets into Bina COCO.
//!
//! An archive is extracted into a workspace, its files are sorted into
//! images and annotations, and the annotation format (Pascal VOC, COCO or
//! YOLO) is detected. The matching parser reads the annotations into an
//! intermediate representation, which is validated and then mapped into
//! a Bina COCO JSON document.
//!
//! # Modules
//!
//! - [`archive`]: Zip extraction and workspace layout
//! - [`detect`]: Per-file format probes
//! - [`ir`]: Intermediate representation and format parsers
//! - [`validation`]: Dataset checks before mapping
//! - [`bina`]: Bina COCO document, mapper and writer
//! - [`convert`]: The end-to-end pipeline
//! - [`error`]: Error types for binacoco operations

pub mod archive;
pub mod bina;
pub mod convert;
pub mod detect;
pub mod error;
pub mod ir;
pub mod validation;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

pub use error::BinaCocoError;

use crate::archive::ExplorationSummary;
use crate::bina::MapOptions;
use crate::convert::{convert_archive, detect_archive, ConvertOptions};
use crate::detect::SourceFormat;

/// The binacoco CLI application.
#[derive(Parser)]
#[command(name = "binacoco")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a zipped dataset into a Bina COCO JSON file.
    Convert(ConvertArgs),
    /// Extract a zipped dataset and report its annotation format.
    Detect(DetectArgs),
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Zip archive containing images and annotations.
    archive: PathBuf,

    /// Output file (default: <workspace>/cocos/train_coco.json).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory the converted_<archive> workspace is created in.
    #[arg(long, env = "BINACOCO_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// First ID assigned to images and annotations.
    #[arg(long, default_value_t = 0)]
    id_start: u64,

    /// First category ID (default: same as --id-start).
    #[arg(long)]
    category_id_start: Option<u64>,

    /// Treat validation warnings as errors.
    #[arg(long)]
    strict: bool,

    /// Format of the summary printed to stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(clap::Args)]
struct DetectArgs {
    /// Zip archive containing images and annotations.
    archive: PathBuf,

    /// Directory the converted_<archive> workspace is created in.
    #[arg(long, env = "BINACOCO_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// Installs the stderr logger.
///
/// `RUST_LOG` takes precedence; otherwise binacoco logs at `info` and
/// other crates stay quiet.
pub fn init_logging() {
    let mut builder = env_logger::Builder::new();
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else {
        builder.filter(None, LevelFilter::Off);
        builder.filter(Some("binacoco"), LevelFilter::Info);
    }
    builder.format_timestamp(None).format_target(false);
    // A second init (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
}

/// Run the binacoco CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), BinaCocoError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Detect(args)) => run_detect(args),
        None => {
            println!("binacoco {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert zipped annotation datasets into Bina COCO.");
            println!();
            println!("Run 'binacoco --help' for usage information.");
            Ok(())
        }
    }
}

fn run_convert(args: ConvertArgs) -> Result<(), BinaCocoError> {
    let opts = ConvertOptions {
        archive: args.archive,
        output: args.output,
        work_dir: args.work_dir,
        strict: args.strict,
        map: MapOptions {
            id_start: args.id_start,
            category_id_start: args.category_id_start,
        },
    };

    let outcome = match convert_archive(&opts) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let BinaCocoError::ValidationFailed { report, .. } = &err {
                match args.report {
                    ReportFormat::Json => println!("{}", to_json(report)?),
                    ReportFormat::Text => eprint!("{}", report),
                }
            }
            return Err(err);
        }
    };

    if args.report == ReportFormat::Json {
        println!("{}", to_json(&outcome)?);
        return Ok(());
    }

    println!(
        "Converted {} ({}): {} images, {} categories, {} annotations",
        opts.archive.display(),
        outcome.format,
        outcome.counts.images,
        outcome.counts.categories,
        outcome.counts.annotations
    );
    if outcome.warnings > 0 {
        println!("  {} validation warning(s)", outcome.warnings);
    }
    println!("  Output: {}", outcome.output_path.display());
    Ok(())
}

fn run_detect(args: DetectArgs) -> Result<(), BinaCocoError> {
    let summary = detect_archive(&args.archive, &args.work_dir)?;

    match args.output {
        ReportFormat::Json => {
            println!("{}", to_json(&summary)?);
        }
        ReportFormat::Text => print_summary(&summary),
    }

    if summary.annotation_format.is_none() {
        return Err(BinaCocoError::UnrecognizedFormat { path: args.archive });
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, BinaCocoError> {
    Ok(serde_json::to_string_pretty(value).map_err(std::io::Error::from)?)
}

fn print_summary(summary: &ExplorationSummary) {
    println!("Dataset: {}", summary.dataset_name);
    println!(
        "Format: {}",
        summary
            .annotation_format
            .map(|format| format.name())
            .unwrap_or("unrecognized")
    );
    println!("Images: {}", summary.num_images);
    println!("Annotation files: {}", summary.num_annotation_files);
    for format in SourceFormat::PRIORITY {
        let count = summary.format_counts.count(format);
        if count > 0 {
            println!("  {}: {}", format, count);
        }
    }
}
