//! Sanity checks on a parsed dataset before it is mapped to Bina COCO.
//!
//! Errors mean the dataset can't be written as a consistent document
//! (duplicate IDs, dangling references, broken geometry). Warnings flag
//! data that converts fine but is probably wrong.

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::{HashMap, HashSet};

use crate::error::BinaCocoError;
use crate::ir::{Annotation, AnnotationId, CategoryId, Dataset, ImageId};

/// Pixels a box may stick out of its image before it is flagged.
const BOUNDS_TOLERANCE: f64 = 0.5;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Treat warnings as errors.
    pub strict: bool,
}

/// Checks a dataset and collects every issue found.
pub fn validate_dataset(dataset: &Dataset, _opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    if dataset.is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::EmptyDataset,
            "No images or annotations were read",
            IssueContext::Dataset,
        ));
        return report;
    }

    validate_images(dataset, &mut report);
    validate_categories(dataset, &mut report);
    validate_annotations(dataset, &mut report);

    report
}

/// Validates and turns a failing report into [`BinaCocoError::ValidationFailed`].
///
/// With `strict` set, warnings fail too. The report is returned on success
/// so callers can log what was tolerated.
pub fn ensure_valid(
    dataset: &Dataset,
    opts: &ValidateOptions,
) -> Result<ValidationReport, BinaCocoError> {
    let report = validate_dataset(dataset, opts);
    let passed = if opts.strict {
        report.is_ok_strict()
    } else {
        report.is_ok()
    };

    if passed {
        Ok(report)
    } else {
        Err(BinaCocoError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    }
}

fn validate_images(dataset: &Dataset, report: &mut ValidationReport) {
    let mut seen_ids: HashMap<ImageId, usize> = HashMap::new();
    let mut seen_names: HashMap<&str, ImageId> = HashMap::new();

    for (idx, image) in dataset.images.iter().enumerate() {
        let id = image.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&image.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateImageId,
                format!("Duplicate image ID {id} (first seen at index {first_idx})"),
                IssueContext::Image { id },
            ));
        } else {
            seen_ids.insert(image.id, idx);
        }

        if image.width == 0 || image.height == 0 {
            report.add(ValidationIssue::error(
                IssueCode::InvalidImageDimensions,
                format!(
                    "Invalid dimensions {}x{} (must be positive)",
                    image.width, image.height
                ),
                IssueContext::Image { id },
            ));
        }

        if image.file_name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyFileName,
                "Empty filename",
                IssueContext::Image { id },
            ));
        } else if let Some(first_id) = seen_names.get(image.file_name.as_str()) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateFileName,
                format!(
                    "File name '{}' is also used by image {}",
                    image.file_name, first_id
                ),
                IssueContext::Image { id },
            ));
        } else {
            seen_names.insert(&image.file_name, image.id);
        }
    }
}

fn validate_categories(dataset: &Dataset, report: &mut ValidationReport) {
    let mut seen_ids: HashMap<CategoryId, usize> = HashMap::new();
    let mut seen_names: HashMap<&str, CategoryId> = HashMap::new();

    for (idx, category) in dataset.categories.iter().enumerate() {
        let id = category.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&category.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateCategoryId,
                format!("Duplicate category ID {id} (first seen at index {first_idx})"),
                IssueContext::Category { id },
            ));
        } else {
            seen_ids.insert(category.id, idx);
        }

        if category.name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyCategoryName,
                "Empty category name",
                IssueContext::Category { id },
            ));
        } else if let Some(first_id) = seen_names.get(category.name.as_str()) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateCategoryName,
                format!(
                    "Duplicate category name '{}' (also used by category {})",
                    category.name, first_id
                ),
                IssueContext::Category { id },
            ));
        } else {
            seen_names.insert(&category.name, category.id);
        }
    }
}

fn validate_annotations(dataset: &Dataset, report: &mut ValidationReport) {
    let category_ids: HashSet<CategoryId> = dataset.categories.iter().map(|c| c.id).collect();
    let image_dims: HashMap<ImageId, (u32, u32)> = dataset
        .images
        .iter()
        .map(|i| (i.id, (i.width, i.height)))
        .collect();
    let mut seen_ids: HashMap<AnnotationId, usize> = HashMap::new();

    for (idx, annotation) in dataset.annotations.iter().enumerate() {
        let id = annotation.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&annotation.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateAnnotationId,
                format!("Duplicate annotation ID {id} (first seen at index {first_idx})"),
                IssueContext::Annotation { id },
            ));
        } else {
            seen_ids.insert(annotation.id, idx);
        }

        if !image_dims.contains_key(&annotation.image_id) {
            report.add(ValidationIssue::error(
                IssueCode::MissingImageRef,
                format!("References non-existent image {}", annotation.image_id),
                IssueContext::Annotation { id },
            ));
        }

        if !category_ids.contains(&annotation.category_id) {
            report.add(ValidationIssue::error(
                IssueCode::MissingCategoryRef,
                format!(
                    "References non-existent category {}",
                    annotation.category_id
                ),
                IssueContext::Annotation { id },
            ));
        }

        validate_segmentation(annotation, report);

        if let Some(area) = annotation.area {
            if !area.is_finite() || area < 0.0 {
                report.add(ValidationIssue::warning(
                    IssueCode::InvalidArea,
                    format!("Source area {area} is negative or not finite"),
                    IssueContext::Annotation { id },
                ));
            }
        }

        let bbox = &annotation.bbox;
        if !bbox.is_finite() {
            report.add(ValidationIssue::error(
                IssueCode::BBoxNotFinite,
                format!(
                    "Non-finite coordinates ({}, {}, {}, {})",
                    bbox.xmin(),
                    bbox.ymin(),
                    bbox.xmax(),
                    bbox.ymax()
                ),
                IssueContext::Annotation { id },
            ));
            continue;
        }

        if !bbox.is_ordered() {
            report.add(ValidationIssue::error(
                IssueCode::InvalidBBoxOrdering,
                format!(
                    "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                    bbox.xmin(),
                    bbox.ymin(),
                    bbox.xmax(),
                    bbox.ymax()
                ),
                IssueContext::Annotation { id },
            ));
            continue;
        }

        let area = bbox.area();
        if area <= 0.0 {
            report.add(ValidationIssue::warning(
                IssueCode::InvalidBBoxArea,
                format!("Zero-area bounding box ({:.2})", area),
                IssueContext::Annotation { id },
            ));
        }

        if let Some((width, height)) = image_dims.get(&annotation.image_id) {
            let (w, h) = (f64::from(*width), f64::from(*height));
            if bbox.xmin() < -BOUNDS_TOLERANCE
                || bbox.ymin() < -BOUNDS_TOLERANCE
                || bbox.xmax() > w + BOUNDS_TOLERANCE
                || bbox.ymax() > h + BOUNDS_TOLERANCE
            {
                report.add(ValidationIssue::warning(
                    IssueCode::BBoxOutOfBounds,
                    format!(
                        "Bounding box ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                        bbox.xmin(), bbox.ymin(), bbox.xmax(), bbox.ymax(), width, height
                    ),
                    IssueContext::Annotation { id },
                ));
            }
        }
    }
}

fn validate_segmentation(annotation: &Annotation, report: &mut ValidationReport) {
    let id = annotation.id.as_u64();
    for (index, polygon) in annotation.segmentation.iter().enumerate() {
        let coords = polygon.0.len();
        if coords % 2 != 0 || coords < 6 {
            report.add(ValidationIssue::warning(
                IssueCode::InvalidPolygon,
                format!(
                    "Polygon {index} has {coords} coordinate(s); expected an even count of at least 6"
                ),
                IssueContext::Annotation { id },
            ));
        } else if polygon.0.iter().any(|v| !v.is_finite()) {
            report.add(ValidationIssue::error(
                IssueCode::InvalidPolygon,
                format!("Polygon {index} has non-finite coordinates"),
                IssueContext::Annotation { id },
            ));
        }
    }
}
