//! Bina COCO mapping and serialization.
//!
//! Bina COCO is COCO's `images` / `categories` / `annotations` structure
//! plus a fixed set of extra top-level members that downstream tooling
//! expects to find, even when empty. Key order in the written file is the
//! field order of [`BinaCoco`].
//!
//! The mapper renumbers every entity densely, so the output does not
//! depend on how a particular source happened to number its records.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BinaCocoError;
use crate::ir::{CategoryId, Dataset, ImageId};

/// A complete Bina COCO document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaCoco {
    pub info: Map<String, Value>,
    pub images: Vec<BinaImage>,
    pub categories: Vec<BinaCategory>,
    pub licenses: Vec<Value>,
    pub errors: Vec<Value>,
    pub annotations: Vec<BinaAnnotation>,
    pub labels: Vec<Value>,
    pub classifications: Vec<Value>,
    pub augmentation_settings: Map<String, Value>,
    pub tile_settings: Map<String, Value>,
    #[serde(rename = "False_positive")]
    pub false_positive: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaImage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    /// Base name of the image as the parser resolved it.
    pub image_name: String,
    /// The source's full image path when it recorded one, else the
    /// resolved file name.
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaCategory {
    pub id: u64,
    pub name: String,
    /// Written as `null` when the source has none.
    pub supercategory: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaAnnotation {
    pub id: u64,
    /// Flat `[x1, y1, x2, y2, ...]` polygons; empty for box-only sources.
    pub segmentation: Vec<Vec<f64>>,
    pub image_id: u64,
    pub category_id: u64,
    pub area: f64,
    /// `[x, y, width, height]`, top-left origin, pixels.
    pub bbox: [f64; 4],
    pub iscrowd: u8,
}

impl BinaCoco {
    /// The skeleton document with every list and object empty.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// How output IDs are assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapOptions {
    /// First ID given to images and annotations (and categories, unless
    /// `category_id_start` is set).
    pub id_start: u64,

    /// First category ID. Some consumers want classes from 0, others
    /// from 1, independently of the other entities.
    pub category_id_start: Option<u64>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            id_start: 0,
            category_id_start: None,
        }
    }
}

/// Maps an IR dataset into a Bina COCO document.
///
/// Each entity list is ordered by its IR ID and renumbered consecutively.
/// Annotation references are rewritten through the same renumbering; a
/// reference that does not resolve is an error rather than a silently
/// broken output.
pub fn to_bina(dataset: &Dataset, opts: &MapOptions) -> Result<BinaCoco, BinaCocoError> {
    let mut images: Vec<_> = dataset.images.iter().collect();
    images.sort_by_key(|image| image.id);
    let mut categories: Vec<_> = dataset.categories.iter().collect();
    categories.sort_by_key(|category| category.id);
    let mut annotations: Vec<_> = dataset.annotations.iter().collect();
    annotations.sort_by_key(|annotation| annotation.id);

    let image_ids: HashMap<ImageId, u64> = images
        .iter()
        .zip(opts.id_start..)
        .map(|(image, new_id)| (image.id, new_id))
        .collect();
    let category_start = opts.category_id_start.unwrap_or(opts.id_start);
    let category_ids: HashMap<CategoryId, u64> = categories
        .iter()
        .zip(category_start..)
        .map(|(category, new_id)| (category.id, new_id))
        .collect();

    let images = images
        .iter()
        .map(|image| BinaImage {
            id: image_ids[&image.id],
            width: image.width,
            height: image.height,
            image_name: base_name(&image.file_name),
            file_name: image
                .source_path
                .clone()
                .unwrap_or_else(|| image.file_name.clone()),
        })
        .collect();

    let categories = categories
        .iter()
        .map(|category| BinaCategory {
            id: category_ids[&category.id],
            name: category.name.clone(),
            supercategory: category.supercategory.clone(),
        })
        .collect();

    let annotations = annotations
        .iter()
        .zip(opts.id_start..)
        .map(|(annotation, new_id)| {
            let image_id = *image_ids.get(&annotation.image_id).ok_or(
                BinaCocoError::DanglingReference {
                    annotation_id: annotation.id.as_u64(),
                    kind: "image",
                    target_id: annotation.image_id.as_u64(),
                },
            )?;
            let category_id = *category_ids.get(&annotation.category_id).ok_or(
                BinaCocoError::DanglingReference {
                    annotation_id: annotation.id.as_u64(),
                    kind: "category",
                    target_id: annotation.category_id.as_u64(),
                },
            )?;
            let (x, y, w, h) = annotation.bbox.to_xywh();

            Ok(BinaAnnotation {
                id: new_id,
                segmentation: annotation
                    .segmentation
                    .iter()
                    .map(|polygon| polygon.0.clone())
                    .collect(),
                image_id,
                category_id,
                area: annotation.effective_area(),
                bbox: [x, y, w, h],
                iscrowd: u8::from(annotation.iscrowd),
            })
        })
        .collect::<Result<Vec<_>, BinaCocoError>>()?;

    Ok(BinaCoco {
        images,
        categories,
        annotations,
        ..BinaCoco::empty()
    })
}

/// Serializes a document as pretty JSON, four-space indented, with a
/// trailing newline.
pub fn to_bina_string(doc: &BinaCoco) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut serializer)?;
    buf.push(b'\n');
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Writes a document to `path`, creating parent directories as needed.
pub fn write_bina_json(path: &Path, doc: &BinaCoco) -> Result<(), BinaCocoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = to_bina_string(doc).map_err(|source| BinaCocoError::BinaJsonWrite {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a Bina COCO document back from disk.
pub fn read_bina_json(path: &Path) -> Result<BinaCoco, BinaCocoError> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| BinaCocoError::BinaJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

fn base_name(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(file_name)
        .to_string()
}
