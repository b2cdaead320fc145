//! Pascal VOC XML reader.
//!
//! Reads a flat directory holding one `<annotation>` XML file per image,
//! which is how the archive organizer lays out VOC sources. The IR keeps
//! VOC's pixel-space XYXY boxes unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;

use super::model::{Annotation, Category, Dataset, Image};
use super::{AnnotationId, BBoxXYXY, CategoryId, ImageId, Pixel};
use crate::error::BinaCocoError;

const VOC_XML_EXTENSION: &str = "xml";

/// Read every VOC XML file directly inside `dir` into one dataset.
///
/// Files are visited in file-name order. Images are numbered in that order
/// and categories in order of first appearance, both starting at 1.
///
/// With `images_dir` set, each declared `<filename>` is resolved against
/// it. When the organizer had to rename an image (`valid/a.jpg` flattened
/// to `valid_a.jpg`), its XML was renamed the same way, so the XML's own
/// stem finds the moved image.
pub fn read_voc_dir(dir: &Path, images_dir: Option<&Path>) -> Result<Dataset, BinaCocoError> {
    let xml_files = collect_xml_files(dir)?;
    log::debug!("reading {} VOC file(s) from {}", xml_files.len(), dir.display());

    let mut builder = VocDatasetBuilder::default();
    for xml_path in xml_files {
        let mut parsed = parse_voc_xml(&xml_path)?;
        if let Some(images_dir) = images_dir {
            parsed.filename = resolve_image_name(images_dir, &xml_path, parsed.filename);
        }
        builder.push(parsed);
    }

    Ok(builder.finish())
}

/// Parse a single VOC XML document held in memory.
pub fn from_voc_xml_str(xml: &str) -> Result<Dataset, BinaCocoError> {
    let parsed = parse_voc_xml_str(xml, Path::new("<memory>"))?;
    let mut builder = VocDatasetBuilder::default();
    builder.push(parsed);
    Ok(builder.finish())
}

#[derive(Default)]
struct VocDatasetBuilder {
    dataset: Dataset,
    category_id_by_name: BTreeMap<String, CategoryId>,
}

impl VocDatasetBuilder {
    fn push(&mut self, parsed: ParsedVocAnnotation) {
        let image_id = ImageId::new(self.dataset.images.len() as u64 + 1);
        let mut image = Image::new(image_id, parsed.filename, parsed.width, parsed.height);
        image.source_path = parsed.path;
        self.dataset.images.push(image);

        for object in parsed.objects {
            let category_id = self.category_id(&object.name);
            let bbox =
                BBoxXYXY::<Pixel>::from_xyxy(object.xmin, object.ymin, object.xmax, object.ymax);
            let annotation_id = AnnotationId::new(self.dataset.annotations.len() as u64 + 1);
            self.dataset
                .annotations
                .push(Annotation::new(annotation_id, image_id, category_id, bbox));
        }
    }

    fn category_id(&mut self, name: &str) -> CategoryId {
        if let Some(id) = self.category_id_by_name.get(name) {
            return *id;
        }
        let id = CategoryId::new(self.dataset.categories.len() as u64 + 1);
        self.dataset.categories.push(Category::new(id, name));
        self.category_id_by_name.insert(name.to_string(), id);
        id
    }

    fn finish(self) -> Dataset {
        self.dataset
    }
}

/// The image file in `images_dir` that `declared` refers to.
///
/// Falls back to `<xml stem>.<declared extension>` when the declared name
/// is absent, and to the declared name when neither exists.
fn resolve_image_name(images_dir: &Path, xml_path: &Path, declared: String) -> String {
    let declared_base = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared.as_str())
        .to_string();
    if images_dir.join(&declared_base).is_file() {
        return declared_base;
    }

    let renamed = xml_path.file_stem().map(|stem| {
        let mut name = stem.to_string_lossy().into_owned();
        if let Some(ext) = Path::new(&declared_base).extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        name
    });
    match renamed {
        Some(name) if images_dir.join(&name).is_file() => {
            log::debug!("{} refers to renamed image {}", xml_path.display(), name);
            name
        }
        _ => declared,
    }
}

#[derive(Debug)]
struct ParsedVocAnnotation {
    filename: String,
    path: Option<String>,
    width: u32,
    height: u32,
    objects: Vec<ParsedVocObject>,
}

#[derive(Debug)]
struct ParsedVocObject {
    name: String,
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

fn collect_xml_files(dir: &Path) -> Result<Vec<PathBuf>, BinaCocoError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_xml_extension(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn parse_voc_xml(path: &Path) -> Result<ParsedVocAnnotation, BinaCocoError> {
    let xml = fs::read_to_string(path)?;
    parse_voc_xml_str(&xml, path)
}

fn parse_voc_xml_str(xml: &str, path: &Path) -> Result<ParsedVocAnnotation, BinaCocoError> {
    let document =
        roxmltree::Document::parse(xml).map_err(|source| BinaCocoError::VocXmlParse {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(BinaCocoError::VocXmlParse {
            path: path.to_path_buf(),
            message: "missing <annotation> root element".to_string(),
        });
    }

    let filename = required_child_text(annotation, "filename", path, "<annotation>")?;
    let image_path = optional_child_text(annotation, "path");

    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required_u32(size, "width", path, "<size>")?;
    let height = parse_required_u32(size, "height", path, "<size>")?;

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let name = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        let xmin = parse_required_f64(bndbox, "xmin", path, "<bndbox>")?;
        let ymin = parse_required_f64(bndbox, "ymin", path, "<bndbox>")?;
        let xmax = parse_required_f64(bndbox, "xmax", path, "<bndbox>")?;
        let ymax = parse_required_f64(bndbox, "ymax", path, "<bndbox>")?;

        objects.push(ParsedVocObject {
            name,
            xmin,
            ymin,
            xmax,
            ymax,
        });
    }

    Ok(ParsedVocAnnotation {
        filename,
        path: image_path,
        width,
        height,
        objects,
    })
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, BinaCocoError> {
    child_element(node, tag).ok_or_else(|| BinaCocoError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, BinaCocoError> {
    optional_child_text(node, tag).ok_or_else(|| BinaCocoError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn parse_required_u32(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<u32, BinaCocoError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<u32>().map_err(|_| BinaCocoError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("invalid <{tag}> value '{raw}' in {context}; expected u32"),
    })
}

fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<f64, BinaCocoError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<f64>().map_err(|_| BinaCocoError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!(
            "invalid <{tag}> value '{raw}' in {context}; expected floating-point number"
        ),
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(VOC_XML_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<annotation>
  <folder>train</folder>
  <filename>img1.jpg</filename>
  <path>/data/img1.jpg</path>
  <size>
    <width>640</width>
    <height>480</height>
    <depth>3</depth>
  </size>
  <object>
    <name>cat</name>
    <pose>Unspecified</pose>
    <truncated>1</truncated>
    <difficult>0</difficult>
    <bndbox>
      <xmin>10</xmin>
      <ymin>20</ymin>
      <xmax>30.5</xmax>
      <ymax>40</ymax>
    </bndbox>
  </object>
</annotation>"#;

    #[test]
    fn parse_voc_xml_extracts_bbox_and_path() {
        let parsed = parse_voc_xml_str(SAMPLE, Path::new("sample.xml")).expect("parse xml");
        assert_eq!(parsed.filename, "img1.jpg");
        assert_eq!(parsed.path.as_deref(), Some("/data/img1.jpg"));
        assert_eq!(parsed.width, 640);
        assert_eq!(parsed.height, 480);
        assert_eq!(parsed.objects.len(), 1);

        let object = &parsed.objects[0];
        assert_eq!(object.name, "cat");
        assert_eq!(object.xmax, 30.5);
    }

    #[test]
    fn from_str_builds_a_dataset() {
        let dataset = from_voc_xml_str(SAMPLE).expect("parse xml");
        assert_eq!(dataset.images.len(), 1);
        assert_eq!(dataset.images[0].file_name, "img1.jpg");
        assert_eq!(
            dataset.images[0].source_path.as_deref(),
            Some("/data/img1.jpg")
        );
        assert_eq!(dataset.annotations.len(), 1);
        assert_eq!(dataset.annotations[0].bbox.width(), 20.5);
    }

    #[test]
    fn path_is_optional() {
        let xml = SAMPLE.replace("<path>/data/img1.jpg</path>", "");
        let dataset = from_voc_xml_str(&xml).expect("parse xml");
        assert_eq!(dataset.images[0].source_path, None);
    }

    #[test]
    fn missing_size_is_reported() {
        let xml = "<annotation><filename>a.jpg</filename></annotation>";
        let err = parse_voc_xml_str(xml, Path::new("a.xml")).unwrap_err();
        assert!(err.to_string().contains("missing <size>"), "{err}");
    }

    #[test]
    fn non_numeric_coordinate_is_reported() {
        let xml = SAMPLE.replace("<xmin>10</xmin>", "<xmin>ten</xmin>");
        let err = from_voc_xml_str(&xml).unwrap_err();
        assert!(err.to_string().contains("invalid <xmin> value 'ten'"), "{err}");
    }

    #[test]
    fn read_dir_assigns_categories_in_first_seen_order() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let second = SAMPLE
            .replace("img1.jpg", "img2.jpg")
            .replace("<name>cat</name>", "<name>dog</name>");
        fs::write(temp.path().join("b.xml"), second).expect("write b.xml");
        fs::write(temp.path().join("a.xml"), SAMPLE).expect("write a.xml");
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write notes");

        let dataset = read_voc_dir(temp.path(), None).expect("read voc dir");
        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.images[0].file_name, "img1.jpg");
        assert_eq!(dataset.categories[0].name, "cat");
        assert_eq!(dataset.categories[1].name, "dog");
        assert_eq!(dataset.annotations[1].category_id, CategoryId(2));
        assert_eq!(dataset.annotations[1].image_id, ImageId(2));
    }

    #[test]
    fn duplicate_filenames_are_read() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("a.xml"), SAMPLE).expect("write a.xml");
        fs::write(temp.path().join("b.xml"), SAMPLE).expect("write b.xml");

        let dataset = read_voc_dir(temp.path(), None).expect("read voc dir");
        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.images[1].id, ImageId(2));
        assert_eq!(dataset.images[1].file_name, "img1.jpg");
    }

    #[test]
    fn renamed_images_are_found_by_xml_stem() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let xml_dir = temp.path().join("xml");
        let images_dir = temp.path().join("images");
        fs::create_dir_all(&xml_dir).expect("create xml dir");
        fs::create_dir_all(&images_dir).expect("create images dir");

        fs::write(xml_dir.join("train_img1.xml"), SAMPLE).expect("write train xml");
        fs::write(xml_dir.join("valid_img1.xml"), SAMPLE).expect("write valid xml");
        fs::write(xml_dir.join("other.xml"), SAMPLE.replace("img1.jpg", "img9.jpg"))
            .expect("write other xml");
        fs::write(images_dir.join("train_img1.jpg"), b"x").expect("write image");
        fs::write(images_dir.join("valid_img1.jpg"), b"x").expect("write image");

        let dataset =
            read_voc_dir(&xml_dir, Some(images_dir.as_path())).expect("read voc dir");
        let names: Vec<&str> = dataset.images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["img9.jpg", "train_img1.jpg", "valid_img1.jpg"]);
    }
}
