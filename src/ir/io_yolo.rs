//! YOLO label reader.
//!
//! A YOLO source is a directory of `<stem>.txt` label files next to an
//! image directory holding `<stem>.<ext>`. Each label row is
//! `class_id cx cy w h` with coordinates normalized to the image size, so
//! the image header has to be read to recover pixel boxes.
//!
//! Class names come from `data.yaml` or `classes.txt` in the labels
//! directory, falling back to `class_<n>` names inferred from the rows.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use super::model::{Annotation, Category, Dataset, Image};
use super::{AnnotationId, BBoxXYXY, CategoryId, ImageId, Normalized};
use crate::archive::{has_image_extension, IMAGE_EXTENSIONS};
use crate::error::BinaCocoError;

const LABEL_EXTENSION: &str = "txt";
const DATA_YAML: &str = "data.yaml";
const CLASSES_TXT: &str = "classes.txt";

/// Read YOLO labels from `labels_dir`, pairing them with images found
/// under `images_dir`.
///
/// Images are numbered from 1 in relative-path order; images with no
/// label file are kept with no annotations. Category `n + 1` corresponds
/// to YOLO class `n`.
pub fn read_yolo_dir(labels_dir: &Path, images_dir: &Path) -> Result<Dataset, BinaCocoError> {
    for dir in [labels_dir, images_dir] {
        if !dir.is_dir() {
            return Err(BinaCocoError::YoloLayoutInvalid {
                path: dir.to_path_buf(),
                message: "expected a directory".to_string(),
            });
        }
    }

    let class_map = read_class_map(labels_dir)?;

    let mut image_files = collect_image_files(images_dir)?;
    image_files.sort_by_cached_key(|image_path| rel_string(images_dir, image_path));

    let mut images = Vec::with_capacity(image_files.len());
    let mut image_lookup: BTreeMap<String, ImageMeta> = BTreeMap::new();

    for (index, image_path) in image_files.iter().enumerate() {
        let rel = rel_string(images_dir, image_path);
        let (width, height) = read_image_dimensions(image_path)?;
        let image_id = ImageId::new((index + 1) as u64);

        images.push(Image::new(image_id, rel.clone(), width, height));
        image_lookup.insert(
            rel,
            ImageMeta {
                id: image_id,
                width,
                height,
            },
        );
    }

    let categories: Vec<Category> = class_map
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| Category::new((i + 1) as u64, name.clone()))
        .collect();

    let mut label_files = collect_label_files(labels_dir)?;
    label_files.sort_by_cached_key(|label_path| rel_string(labels_dir, label_path));

    let mut annotations = Vec::new();
    let mut next_annotation_id: u64 = 1;

    for label_path in label_files {
        let label_rel = label_path
            .strip_prefix(labels_dir)
            .unwrap_or(&label_path)
            .to_path_buf();
        let not_found = || BinaCocoError::YoloImageNotFound {
            label_path: label_path.clone(),
            expected_stem: rel_string(labels_dir, &label_path.with_extension("")),
        };

        let image_path = find_image_for_label(images_dir, &label_rel).ok_or_else(not_found)?;
        let image_meta = image_lookup
            .get(&rel_string(images_dir, &image_path))
            .copied()
            .ok_or_else(not_found)?;

        let content = fs::read_to_string(&label_path)?;
        for (line_idx, line) in content.lines().enumerate() {
            let line_num = line_idx + 1;
            let Some(parsed) = parse_label_line(line, &label_path, line_num)? else {
                continue;
            };

            if parsed.class_id >= class_map.names.len() {
                return Err(BinaCocoError::YoloLabelParse {
                    path: label_path.clone(),
                    line: line_num,
                    message: format!(
                        "class_id {} is out of range for class map with {} class(es)",
                        parsed.class_id,
                        class_map.names.len()
                    ),
                });
            }

            let bbox_norm =
                BBoxXYXY::<Normalized>::from_cxcywh(parsed.cx, parsed.cy, parsed.w, parsed.h);
            let bbox_px = bbox_norm.to_pixel(image_meta.width as f64, image_meta.height as f64);

            annotations.push(Annotation::new(
                AnnotationId::new(next_annotation_id),
                image_meta.id,
                CategoryId::new(parsed.class_id as u64 + 1),
                bbox_px,
            ));
            next_annotation_id += 1;
        }
    }

    Ok(Dataset {
        images,
        categories,
        annotations,
    })
}

/// Returns true if `name` is a YOLO class map file name.
pub fn is_class_map_file(name: &str) -> bool {
    name.eq_ignore_ascii_case(DATA_YAML) || name.eq_ignore_ascii_case(CLASSES_TXT)
}

#[derive(Clone, Copy)]
struct ImageMeta {
    id: ImageId,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct YoloClassMap {
    names: Vec<String>,
}

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

fn read_class_map(labels_dir: &Path) -> Result<YoloClassMap, BinaCocoError> {
    let data_yaml = labels_dir.join(DATA_YAML);
    let classes_txt = labels_dir.join(CLASSES_TXT);

    if data_yaml.is_file() {
        read_data_yaml_names(&data_yaml)
    } else if classes_txt.is_file() {
        read_classes_txt(&classes_txt)
    } else {
        log::info!("no data.yaml or classes.txt found; inferring YOLO class names");
        infer_class_map(labels_dir)
    }
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

fn read_data_yaml_names(path: &Path) -> Result<YoloClassMap, BinaCocoError> {
    let data = fs::read_to_string(path)?;
    let parsed: DataYaml =
        serde_yaml::from_str(&data).map_err(|source| BinaCocoError::YoloDataYamlParse {
            path: path.to_path_buf(),
            source,
        })?;

    let names = match parsed.names {
        DataYamlNames::Sequence(names) => names,
        DataYamlNames::Mapping(mapping) => {
            let len = mapping.keys().next_back().map_or(0, |max| max + 1);
            (0..len)
                .map(|index| match mapping.get(&index) {
                    Some(name) if !name.trim().is_empty() => name.clone(),
                    _ => format!("class_{index}"),
                })
                .collect()
        }
    };

    Ok(YoloClassMap { names })
}

fn read_classes_txt(path: &Path) -> Result<YoloClassMap, BinaCocoError> {
    let data = fs::read_to_string(path)?;
    let names = data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    Ok(YoloClassMap { names })
}

fn infer_class_map(labels_dir: &Path) -> Result<YoloClassMap, BinaCocoError> {
    let mut class_ids = BTreeSet::new();

    for label_path in collect_label_files(labels_dir)? {
        let content = fs::read_to_string(&label_path)?;
        for (line_idx, line) in content.lines().enumerate() {
            if let Some(parsed) = parse_label_line(line, &label_path, line_idx + 1)? {
                class_ids.insert(parsed.class_id);
            }
        }
    }

    let names = match class_ids.last() {
        Some(max_id) => (0..=*max_id).map(|id| format!("class_{id}")).collect(),
        None => Vec::new(),
    };

    Ok(YoloClassMap { names })
}

/// Label files, excluding the `classes.txt` class map.
fn collect_label_files(labels_dir: &Path) -> Result<Vec<PathBuf>, BinaCocoError> {
    walk_files(labels_dir, |path| {
        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(LABEL_EXTENSION));
        let is_class_map = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_class_map_file);
        is_txt && !is_class_map
    })
}

fn collect_image_files(images_dir: &Path) -> Result<Vec<PathBuf>, BinaCocoError> {
    walk_files(images_dir, has_image_extension)
}

/// Regular files below `root` accepted by `keep`, in no particular order.
fn walk_files(
    root: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, BinaCocoError> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() && keep(entry.path()) => {
                Some(Ok(entry.into_path()))
            }
            Ok(_) => None,
            Err(source) => Some(Err(BinaCocoError::YoloLayoutInvalid {
                path: root.to_path_buf(),
                message: format!("failed while traversing directory: {source}"),
            })),
        })
        .collect()
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), BinaCocoError> {
    let size = imagesize::size(path).map_err(|source| BinaCocoError::YoloImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;

    let width: u32 = size
        .width
        .try_into()
        .map_err(|_| BinaCocoError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: format!("image width {} does not fit in u32", size.width),
        })?;

    let height: u32 = size
        .height
        .try_into()
        .map_err(|_| BinaCocoError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: format!("image height {} does not fit in u32", size.height),
        })?;

    Ok((width, height))
}

fn find_image_for_label(images_dir: &Path, label_rel_path: &Path) -> Option<PathBuf> {
    let stem_rel_path = label_rel_path.with_extension("");
    IMAGE_EXTENSIONS.iter().find_map(|ext| {
        [ext.to_string(), ext.to_ascii_uppercase()]
            .into_iter()
            .map(|ext| images_dir.join(&stem_rel_path).with_extension(ext))
            .find(|candidate| candidate.is_file())
    })
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, BinaCocoError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // At most 6 tokens so a pathological line can't allocate without bound.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();

    if tokens.len() != 5 {
        let message = if tokens.len() < 5 {
            format!("expected 5 tokens, found {}", tokens.len())
        } else {
            "segmentation/pose rows are not supported; expected 'class cx cy w h'".to_string()
        };
        return Err(BinaCocoError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message,
        });
    }

    let class_id = tokens[0]
        .parse::<usize>()
        .map_err(|_| BinaCocoError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "invalid class_id '{}'; expected non-negative integer",
                tokens[0]
            ),
        })?;

    let cx = parse_f64_token(tokens[1], "x_center", file_path, line_num)?;
    let cy = parse_f64_token(tokens[2], "y_center", file_path, line_num)?;
    let w = parse_f64_token(tokens[3], "width", file_path, line_num)?;
    let h = parse_f64_token(tokens[4], "height", file_path, line_num)?;

    Ok(Some(YoloLabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
    }))
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, BinaCocoError> {
    raw.parse::<f64>()
        .map_err(|_| BinaCocoError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("invalid {field_name} '{raw}'; expected floating-point number"),
        })
}

fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
