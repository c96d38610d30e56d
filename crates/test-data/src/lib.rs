//! Synthetic terrain and features for exercising altitude resolution.
//!
//! This crate generates Perlin-noise terrain that plugs into a map as a height
//! source, scatters 3-D line strings and polygons over a region, and runs the
//! two through an [`altitude::AltitudeResolver`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let result = ScenarioBuilder::new()
//!     .with_region(Region::BOULDER)
//!     .with_feature_count(100)
//!     .with_clamping(ClampingMode::RelativeToTerrain)
//!     .run()?;
//! ```

pub mod builders;
pub mod config;
pub mod sources;
pub mod terrain;

// Re-export core types from the altitude crate
pub use altitude::{
    feature::{Feature, Geometry, Point3},
    policy::{ClampingMode, Style},
};

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::builders::{ScenarioBuilder, ScenarioMetrics, ScenarioResult};
    pub use crate::config::{BoundingBox, ConfigError, Region, ScenarioConfig, TerrainPreset};
    pub use crate::sources::{FeatureConfig, FeatureShape, ProceduralGenerator};
    pub use crate::terrain::{ElevationGenerator, add_elevation_jitter};
    pub use crate::{ClampingMode, Feature, Geometry, Point3, Style};
}
