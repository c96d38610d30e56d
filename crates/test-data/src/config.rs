//! Configuration types for synthetic clamping scenarios.

use std::path::Path;

use altitude::policy::Style;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terrain::ElevationGenerator;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Geographic bounding box defined by southwest and northeast corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude (south)
    pub min_lat: f64,
    /// Minimum longitude (west)
    pub min_lon: f64,
    /// Maximum latitude (north)
    pub max_lat: f64,
    /// Maximum longitude (east)
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Returns a random point within the bounding box.
    pub fn random_point(&self, rng: &mut impl rand::Rng) -> (f64, f64) {
        let lat = rng.gen_range(self.min_lat..self.max_lat);
        let lon = rng.gen_range(self.min_lon..self.max_lon);
        (lat, lon)
    }

    /// Returns the center of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    /// Grows the box by `degrees` on every side.
    pub fn expanded(&self, degrees: f64) -> Self {
        Self::new(
            self.min_lat - degrees,
            self.min_lon - degrees,
            self.max_lat + degrees,
            self.max_lon + degrees,
        )
    }
}

/// Pre-defined geographic regions for test data generation.
#[derive(Debug, Clone, Copy)]
pub struct Region;

impl Region {
    /// Reno/Tahoe area - mountain terrain with significant elevation changes.
    pub const RENO_TAHOE: BoundingBox = BoundingBox::new(39.0, -120.5, 39.6, -119.5);

    /// Boulder, CO area - foothills meeting the plains.
    pub const BOULDER: BoundingBox = BoundingBox::new(39.9, -105.5, 40.1, -105.2);
}

/// Which synthetic terrain a scenario runs over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainPreset {
    #[default]
    Boulder,
    RenoTahoe,
    Flat,
}

impl TerrainPreset {
    pub fn generator(self, seed: u32) -> ElevationGenerator {
        match self {
            TerrainPreset::Boulder => ElevationGenerator::boulder(seed),
            TerrainPreset::RenoTahoe => ElevationGenerator::reno_tahoe(seed),
            TerrainPreset::Flat => ElevationGenerator::flat(seed),
        }
    }
}

/// Configuration for one synthetic clamping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Seed for both terrain and features, so runs are reproducible.
    pub seed: u64,

    /// Area the features are generated in.
    pub region: BoundingBox,

    pub terrain: TerrainPreset,

    /// Terrain data stops this many degrees beyond the region. Negative
    /// values leave parts of the region without data.
    pub terrain_margin: f64,

    /// Number of features to generate.
    pub feature_count: usize,

    /// Vertices per feature (range).
    pub vertices_per_feature: (usize, usize),

    /// Fraction of features generated as polygons rather than line strings.
    pub polygon_fraction: f64,

    /// Range of generated Z values, in meters.
    pub height_range: (f64, f64),

    /// Styling rule carrying the altitude symbol to resolve with.
    pub style: Style,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            region: Region::BOULDER,
            terrain: TerrainPreset::default(),
            terrain_margin: 0.05,
            feature_count: 100,
            vertices_per_feature: (4, 40),
            polygon_fraction: 0.3,
            height_range: (0.0, 30.0),
            style: Style::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The scenario's terrain, bounded to the region plus its margin.
    pub fn terrain_generator(&self) -> ElevationGenerator {
        self.terrain
            .generator(self.seed as u32)
            .with_bounds(self.region.expanded(self.terrain_margin))
    }
}
