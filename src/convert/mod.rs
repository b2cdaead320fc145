//! The end-to-end pipeline: archive in, Bina COCO file out.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive::{explore, ExplorationSummary, Workspace};
use crate::bina::{to_bina, write_bina_json, MapOptions};
use crate::detect::SourceFormat;
use crate::error::BinaCocoError;
use crate::ir::io_coco_json::read_coco_dir;
use crate::ir::io_voc_xml::read_voc_dir;
use crate::ir::io_yolo::read_yolo_dir;
use crate::ir::Dataset;
use crate::validation::{ensure_valid, ValidateOptions};

/// Inputs of one conversion run.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub archive: PathBuf,
    /// Output file; defaults to `cocos/train_coco.json` in the workspace.
    pub output: Option<PathBuf>,
    /// Directory the `converted_<name>` workspace is created in.
    pub work_dir: PathBuf,
    /// Fail on validation warnings as well as errors.
    pub strict: bool,
    pub map: MapOptions,
}

impl ConvertOptions {
    pub fn new(archive: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            output: None,
            work_dir: work_dir.into(),
            strict: false,
            map: MapOptions::default(),
        }
    }
}

/// Entity counts of a written document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionCounts {
    pub images: usize,
    pub categories: usize,
    pub annotations: usize,
}

/// What a successful run produced.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionOutcome {
    pub summary: ExplorationSummary,
    pub format: SourceFormat,
    pub output_path: PathBuf,
    pub workspace_root: PathBuf,
    pub counts: ConversionCounts,
    pub warnings: usize,
}

/// Extracts the archive, parses it in its detected format and writes the
/// Bina COCO document.
pub fn convert_archive(opts: &ConvertOptions) -> Result<ConversionOutcome, BinaCocoError> {
    let (workspace, summary) = explore(&opts.archive, &opts.work_dir)?;
    log::info!(
        "{}: {} image(s), {} annotation file(s)",
        summary.dataset_name,
        summary.num_images,
        summary.num_annotation_files
    );

    let format = summary
        .annotation_format
        .ok_or_else(|| BinaCocoError::UnrecognizedFormat {
            path: opts.archive.clone(),
        })?;
    log::info!("detected {} annotations", format);

    let dataset = read_dataset(&workspace, format)?;

    let report = ensure_valid(
        &dataset,
        &ValidateOptions {
            strict: opts.strict,
        },
    )?;
    report.log_issues();

    let doc = to_bina(&dataset, &opts.map)?;
    let output_path = opts
        .output
        .clone()
        .unwrap_or_else(|| workspace.train_coco_path());
    write_bina_json(&output_path, &doc)?;

    let counts = ConversionCounts {
        images: doc.images.len(),
        categories: doc.categories.len(),
        annotations: doc.annotations.len(),
    };
    log::info!(
        "wrote {} ({} images, {} categories, {} annotations)",
        output_path.display(),
        counts.images,
        counts.categories,
        counts.annotations
    );

    Ok(ConversionOutcome {
        summary,
        format,
        output_path,
        workspace_root: workspace.root,
        counts,
        warnings: report.warning_count(),
    })
}

/// Runs the parser for `format` over the organized workspace.
pub fn read_dataset(workspace: &Workspace, format: SourceFormat) -> Result<Dataset, BinaCocoError> {
    let dir = workspace.format_dir(format);
    match format {
        SourceFormat::PascalVoc => {
            read_voc_dir(&dir, Some(workspace.train_images_dir.as_path()))
        }
        SourceFormat::Coco => read_coco_dir(&dir),
        SourceFormat::Yolo => read_yolo_dir(&dir, &workspace.train_images_dir),
    }
}

/// Only explores the archive; nothing is parsed or written besides the
/// workspace itself.
pub fn detect_archive(archive: &Path, work_dir: &Path) -> Result<ExplorationSummary, BinaCocoError> {
    let (_, summary) = explore(archive, work_dir)?;
    Ok(summary)
}
