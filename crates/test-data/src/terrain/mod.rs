//! Terrain generation utilities.
//!
//! Synthetic terrain for clamping runs: Perlin-noise elevation that plugs into
//! a map as a height source.

mod elevation;

pub use elevation::{ElevationGenerator, add_elevation_jitter};
