use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for binacoco operations.
///
/// Every variant is a conversion failure; nothing is retried.
#[derive(Debug, Error)]
pub enum BinaCocoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read zip archive {path}: {source}")]
    ZipRead {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Refusing to extract archive entry '{entry}' from {path}: path escapes the extraction directory")]
    UnsafeArchiveEntry { path: PathBuf, entry: String },

    #[error("No supported annotation format (Pascal VOC, COCO, YOLO) found in {path}")]
    UnrecognizedFormat { path: PathBuf },

    #[error("Failed to parse VOC XML {path}: {message}")]
    VocXmlParse { path: PathBuf, message: String },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse Bina COCO JSON from {path}: {source}")]
    BinaJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write Bina COCO JSON to {path}: {source}")]
    BinaJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid YOLO layout at {path}: {message}")]
    YoloLayoutInvalid { path: PathBuf, message: String },

    #[error("Failed to parse YOLO label {path}:{line}: {message}")]
    YoloLabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to parse YOLO data.yaml {path}: {source}")]
    YoloDataYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No image found for YOLO label {label_path} (expected an image named '{expected_stem}.*')")]
    YoloImageNotFound {
        label_path: PathBuf,
        expected_stem: String,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    YoloImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Duplicate {kind} ID {id} in {path}")]
    DuplicateSourceId {
        path: PathBuf,
        kind: &'static str,
        id: u64,
    },

    #[error("Annotation {annotation_id} references missing {kind} {target_id}")]
    DanglingReference {
        annotation_id: u64,
        kind: &'static str,
        target_id: u64,
    },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },
}
