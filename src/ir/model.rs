//! Core dataset model for the binacoco intermediate representation.
//!
//! Every format parser produces a [`Dataset`]; the Bina COCO mapper
//! consumes one. Entities live only for the duration of a conversion run.

use super::bbox::{BBoxXYXY, Polygon};
use super::ids::{AnnotationId, CategoryId, ImageId};
use super::space::Pixel;

/// A complete annotation dataset.
///
/// Invariant: every annotation's `image_id` and `category_id` resolve to
/// an image and a category of the same dataset. Parsers uphold it and
/// [`validate_dataset`](crate::validation::validate_dataset) reports
/// violations.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub images: Vec<Image>,
    pub categories: Vec<Category>,
    pub annotations: Vec<Annotation>,
}

impl Dataset {
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.categories.is_empty() && self.annotations.is_empty()
    }
}

/// An image in the dataset.
#[derive(Clone, Debug)]
pub struct Image {
    pub id: ImageId,

    /// File name of the image, relative to the workspace image directory
    /// when the parser could resolve it there.
    pub file_name: String,

    /// Full path the source recorded for the image (VOC `<path>`), if any.
    pub source_path: Option<String>,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl Image {
    pub fn new(
        id: impl Into<ImageId>,
        file_name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            source_path: None,
            width,
            height,
        }
    }

    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }
}

/// A category (class label) in the dataset.
#[derive(Clone, Debug)]
pub struct Category {
    pub id: CategoryId,

    /// Name of the category (e.g., "person", "car", "tooth").
    pub name: String,

    /// Optional parent category.
    pub supercategory: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: None,
        }
    }

    pub fn with_supercategory(
        id: impl Into<CategoryId>,
        name: impl Into<String>,
        supercategory: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: Some(supercategory.into()),
        }
    }
}

/// An annotation: a labelled region on one image.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub id: AnnotationId,

    pub image_id: ImageId,

    pub category_id: CategoryId,

    /// Bounding box in pixel coordinates (XYXY).
    pub bbox: BBoxXYXY<Pixel>,

    /// Polygon outlines, empty for box-only sources.
    pub segmentation: Vec<Polygon>,

    /// Area as recorded by the source. When absent the mapper derives it.
    pub area: Option<f64>,

    /// Whether the region covers a crowd of objects.
    pub iscrowd: bool,
}

impl Annotation {
    /// Creates a box-only annotation.
    pub fn new(
        id: impl Into<AnnotationId>,
        image_id: impl Into<ImageId>,
        category_id: impl Into<CategoryId>,
        bbox: BBoxXYXY<Pixel>,
    ) -> Self {
        Self {
            id: id.into(),
            image_id: image_id.into(),
            category_id: category_id.into(),
            bbox,
            segmentation: Vec::new(),
            area: None,
            iscrowd: false,
        }
    }

    pub fn with_segmentation(mut self, polygons: Vec<Polygon>) -> Self {
        self.segmentation = polygons;
        self
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_iscrowd(mut self, iscrowd: bool) -> Self {
        self.iscrowd = iscrowd;
        self
    }

    /// The area to report: the source's value if it had one, else the
    /// polygon area, else the box area.
    pub fn effective_area(&self) -> f64 {
        if let Some(area) = self.area {
            return area;
        }
        if !self.segmentation.is_empty() {
            return self.segmentation.iter().map(Polygon::area).sum();
        }
        self.bbox.area()
    }
}
