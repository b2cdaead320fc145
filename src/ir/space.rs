//! Coordinate space markers.
//!
//! Zero-sized types used as type parameters so that pixel and normalized
//! boxes can't be mixed up.

/// Absolute pixel coordinates, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Coordinates as fractions (0.0 to 1.0) of the image dimensions.
///
/// YOLO label rows are expressed in this space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Normalized {}
