//! Intermediate representation (IR) shared by every format parser.
//!
//! Parsers translate their source schema into a [`Dataset`]; the Bina COCO
//! mapper reads it back out. Boxes are stored in one canonical convention
//! (pixel-space XYXY) so each parser only has to know its own layout.
//!
//! IR types are permissive: a negative or inverted box is representable so
//! that validation can report it instead of a parser panicking.
//!
//! # Example
//!
//! ```
//! use binacoco::ir::{Annotation, BBoxXYXY, Category, Dataset, Image, Pixel};
//!
//! let dataset = Dataset {
//!     images: vec![Image::new(1u64, "image.jpg", 640, 480)],
//!     categories: vec![Category::new(1u64, "person")],
//!     annotations: vec![Annotation::new(
//!         1u64,
//!         1u64,
//!         1u64,
//!         BBoxXYXY::<Pixel>::from_xyxy(10.0, 20.0, 100.0, 200.0),
//!     )],
//! };
//! assert_eq!(dataset.annotations[0].effective_area(), 90.0 * 180.0);
//! ```

mod bbox;
mod coord;
mod ids;
pub mod io_coco_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;
mod space;

pub use bbox::{BBoxXYXY, Polygon};
pub use coord::Coord;
pub use ids::{AnnotationId, CategoryId, ImageId};
pub use model::{Annotation, Category, Dataset, Image};
pub use space::{Normalized, Pixel};
