//! COCO JSON reader.
//!
//! COCO bounding boxes are `[x, y, width, height]` with `(x, y)` the
//! top-left corner in absolute pixels; the IR stores XYXY, so boxes are
//! converted on the way in. Polygon segmentations are kept. RLE masks are
//! dropped because Bina COCO only carries polygons.
//!
//! Archive exports often split a dataset into several COCO files (train,
//! valid, test), each numbering its IDs from zero. [`read_coco_dir`]
//! merges them into one dataset with fresh, collision-free IDs.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::model::{Annotation, Category, Dataset, Image};
use super::{AnnotationId, BBoxXYXY, CategoryId, ImageId, Pixel, Polygon};
use crate::error::BinaCocoError;

const COCO_JSON_EXTENSION: &str = "json";

// ============================================================================
// COCO Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CocoDataset {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: u64,
    width: u32,
    height: u32,
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
    #[serde(default)]
    supercategory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,

    #[serde(default)]
    bbox: Option<[f64; 4]>,

    #[serde(default)]
    area: Option<f64>,

    #[serde(default)]
    iscrowd: Option<u8>,

    #[serde(default)]
    segmentation: Option<CocoSegmentation>,
}

/// Polygon lists, or anything else (RLE objects) which is not kept.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CocoSegmentation {
    Polygons(Vec<Vec<f64>>),
    Other(serde_json::Value),
}

// ============================================================================
// Public API
// ============================================================================

/// Reads a dataset from one COCO JSON file, keeping its IDs.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use binacoco::ir::io_coco_json::read_coco_json;
///
/// let dataset = read_coco_json(Path::new("_annotations.coco.json"))?;
/// # Ok::<(), binacoco::BinaCocoError>(())
/// ```
pub fn read_coco_json(path: &Path) -> Result<Dataset, BinaCocoError> {
    let coco = parse_coco_file(path)?;
    Ok(coco_to_ir(coco))
}

/// Reads every `*.json` file directly inside `dir` and merges them.
///
/// Files are visited in name order. Images and annotations are renumbered
/// from 1 in visit order. Categories are merged by name, the first
/// definition winning, and annotation references are rewritten to match.
pub fn read_coco_dir(dir: &Path) -> Result<Dataset, BinaCocoError> {
    let mut json_files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_json_extension(&path) {
            json_files.push(path);
        }
    }
    json_files.sort();

    let mut merged = DatasetMerger::default();
    for path in &json_files {
        log::debug!("merging COCO file {}", path.display());
        let dataset = coco_to_ir(parse_coco_file(path)?);
        merged.absorb(path, dataset)?;
    }

    Ok(merged.finish())
}

/// Reads a dataset from a COCO JSON string, keeping its IDs.
pub fn from_coco_str(json: &str) -> Result<Dataset, serde_json::Error> {
    let coco: CocoDataset = serde_json::from_str(json)?;
    Ok(coco_to_ir(coco))
}

/// Reads a dataset from a COCO JSON byte slice, keeping its IDs.
pub fn from_coco_slice(bytes: &[u8]) -> Result<Dataset, serde_json::Error> {
    let coco: CocoDataset = serde_json::from_slice(bytes)?;
    Ok(coco_to_ir(coco))
}

fn parse_coco_file(path: &Path) -> Result<CocoDataset, BinaCocoError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| BinaCocoError::CocoJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Conversion: COCO -> IR
// ============================================================================

fn coco_to_ir(coco: CocoDataset) -> Dataset {
    let images = coco
        .images
        .into_iter()
        .map(|img| Image::new(img.id, img.file_name, img.width, img.height))
        .collect();

    let categories = coco
        .categories
        .into_iter()
        .map(|cat| Category {
            id: CategoryId::new(cat.id),
            name: cat.name,
            supercategory: cat.supercategory.filter(|s| !s.trim().is_empty()),
        })
        .collect();

    let annotations = coco.annotations.into_iter().map(annotation_to_ir).collect();

    Dataset {
        images,
        categories,
        annotations,
    }
}

fn annotation_to_ir(ann: CocoAnnotation) -> Annotation {
    let polygons: Vec<Polygon> = match ann.segmentation {
        Some(CocoSegmentation::Polygons(polygons)) => polygons
            .into_iter()
            .filter(|points| !points.is_empty())
            .map(Polygon)
            .collect(),
        Some(CocoSegmentation::Other(value)) => {
            if !value.is_null() {
                log::warn!(
                    "annotation {}: non-polygon segmentation dropped (only polygons are kept)",
                    ann.id
                );
            }
            Vec::new()
        }
        None => Vec::new(),
    };

    let bbox = match ann.bbox {
        Some([x, y, w, h]) => BBoxXYXY::<Pixel>::from_xywh(x, y, w, h),
        None => BBoxXYXY::enclosing(&polygons).unwrap_or_else(|| {
            log::warn!("annotation {} has neither bbox nor polygon", ann.id);
            BBoxXYXY::from_xyxy(0.0, 0.0, 0.0, 0.0)
        }),
    };

    let mut annotation = Annotation::new(
        AnnotationId::new(ann.id),
        ImageId::new(ann.image_id),
        CategoryId::new(ann.category_id),
        bbox,
    )
    .with_segmentation(polygons)
    .with_iscrowd(ann.iscrowd.unwrap_or(0) != 0);
    annotation.area = ann.area;
    annotation
}

// ============================================================================
// Merging several COCO files
// ============================================================================

#[derive(Default)]
struct DatasetMerger {
    merged: Dataset,
    category_by_name: BTreeMap<String, CategoryId>,
}

impl DatasetMerger {
    /// Adds one file's dataset. Source IDs must be unique within the file;
    /// a repeated image or category ID would make references ambiguous.
    fn absorb(&mut self, path: &Path, dataset: Dataset) -> Result<(), BinaCocoError> {
        let duplicate = |kind, id| BinaCocoError::DuplicateSourceId {
            path: path.to_path_buf(),
            kind,
            id,
        };

        let mut image_remap: HashMap<ImageId, ImageId> = HashMap::new();
        for mut image in dataset.images {
            let new_id = ImageId::new(self.merged.images.len() as u64 + 1);
            if image_remap.insert(image.id, new_id).is_some() {
                return Err(duplicate("image", image.id.as_u64()));
            }
            image.id = new_id;
            self.merged.images.push(image);
        }

        let mut category_remap: HashMap<CategoryId, CategoryId> = HashMap::new();
        for mut category in dataset.categories {
            let source_id = category.id;
            let merged_id = match self.category_by_name.get(&category.name) {
                Some(id) => *id,
                None => {
                    let id = CategoryId::new(self.merged.categories.len() as u64 + 1);
                    self.category_by_name.insert(category.name.clone(), id);
                    category.id = id;
                    self.merged.categories.push(category);
                    id
                }
            };
            if category_remap.insert(source_id, merged_id).is_some() {
                return Err(duplicate("category", source_id.as_u64()));
            }
        }

        for mut annotation in dataset.annotations {
            let source_id = annotation.id.as_u64();
            annotation.image_id = *image_remap.get(&annotation.image_id).ok_or(
                BinaCocoError::DanglingReference {
                    annotation_id: source_id,
                    kind: "image",
                    target_id: annotation.image_id.as_u64(),
                },
            )?;
            annotation.category_id = *category_remap.get(&annotation.category_id).ok_or(
                BinaCocoError::DanglingReference {
                    annotation_id: source_id,
                    kind: "category",
                    target_id: annotation.category_id.as_u64(),
                },
            )?;
            annotation.id = AnnotationId::new(self.merged.annotations.len() as u64 + 1);
            self.merged.annotations.push(annotation);
        }

        Ok(())
    }

    fn finish(self) -> Dataset {
        self.merged
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(COCO_JSON_EXTENSION))
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
