//! Sources of synthetic features.
//!
//! [`ProceduralGenerator`] produces 3-D line strings and polygons with
//! attributes, scattered over a region.

mod procedural;

pub use procedural::{FeatureConfig, FeatureShape, ProceduralGenerator};
