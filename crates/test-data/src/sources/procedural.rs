//! Procedural feature generation.

use altitude::feature::{Feature, Geometry, Point3};
use rand::Rng;

use crate::config::{BoundingBox, Region, ScenarioConfig};
use crate::terrain::add_elevation_jitter;

/// Kind of geometry a generated feature carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    /// A random-walk path, like a trail or a pipeline.
    LineString,
    /// A rough ring around a center, like a building footprint or a parcel.
    Polygon,
}

/// Configuration for procedural feature generation.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Geographic bounds for the features.
    pub bounds: BoundingBox,
    /// Vertices per feature (min, max).
    pub vertices: (usize, usize),
    /// Probability that a feature is a polygon (0.0 - 1.0).
    pub polygon_fraction: f64,
    /// Range of Z values in meters.
    pub height_range: (f64, f64),
    /// Standard deviation of the Z change between neighbouring vertices.
    pub height_step_m: f64,
    /// Approximate distance between path vertices in meters.
    pub point_spacing_m: f64,
    /// Polygon radius range (min, max) in meters.
    pub polygon_radius_m: (f64, f64),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bounds: Region::BOULDER,
            vertices: (4, 40),
            polygon_fraction: 0.3,
            height_range: (0.0, 30.0),
            height_step_m: 2.0,
            point_spacing_m: 25.0,
            polygon_radius_m: (10.0, 60.0),
        }
    }
}

/// Generates synthetic 3-D features with attributes.
#[derive(Debug, Clone, Default)]
pub struct ProceduralGenerator {
    config: FeatureConfig,
}

impl ProceduralGenerator {
    /// Creates a new procedural generator with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator for a specific region.
    pub fn for_region(bounds: BoundingBox) -> Self {
        Self {
            config: FeatureConfig {
                bounds,
                ..Default::default()
            },
        }
    }

    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        Self {
            config: FeatureConfig {
                bounds: scenario.region,
                vertices: scenario.vertices_per_feature,
                polygon_fraction: scenario.polygon_fraction,
                height_range: scenario.height_range,
                ..Default::default()
            },
        }
    }

    /// Sets the vertex count range.
    pub fn with_vertices(mut self, min: usize, max: usize) -> Self {
        self.config.vertices = (min, max);
        self
    }

    pub fn with_polygon_fraction(mut self, fraction: f64) -> Self {
        self.config.polygon_fraction = fraction;
        self
    }

    /// Sets the range of generated Z values.
    pub fn with_height_range(mut self, min: f64, max: f64) -> Self {
        self.config.height_range = (min, max);
        self
    }

    /// Sets point spacing.
    pub fn with_point_spacing(mut self, meters: f64) -> Self {
        self.config.point_spacing_m = meters;
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Generates `count` features.
    pub fn generate_batch(&self, count: usize, rng: &mut impl Rng) -> Vec<Feature> {
        (0..count).map(|i| self.generate(i, rng)).collect()
    }

    /// Generates one feature. `index` only feeds its name.
    pub fn generate(&self, index: usize, rng: &mut impl Rng) -> Feature {
        let shape = if rng.r#gen::<f64>() < self.config.polygon_fraction {
            FeatureShape::Polygon
        } else {
            FeatureShape::LineString
        };
        self.generate_shape(shape, index, rng)
    }

    pub fn generate_shape(&self, shape: FeatureShape, index: usize, rng: &mut impl Rng) -> Feature {
        let (min, max) = ordered(self.config.vertices.0, self.config.vertices.1);
        let start = self.config.bounds.random_point(rng);

        match shape {
            FeatureShape::LineString => {
                let path = self.generate_path(start, rng.gen_range(min.max(1)..=max.max(1)), rng);
                let length_m: f64 = path
                    .windows(2)
                    .map(|w| haversine_distance(w[0].0, w[0].1, w[1].0, w[1].1))
                    .sum();
                let points = self.apply_heights(&path, rng);

                Feature::new(Geometry::LineString(points))
                    .with_attribute("name", format!("track-{index}"))
                    .with_attribute("kind", "track")
                    .with_attribute("length_m", length_m)
            }
            FeatureShape::Polygon => {
                let ring = self.generate_ring(start, rng.gen_range(min.max(3)..=max.max(3)), rng);
                let points = self.apply_heights(&ring, rng);

                Feature::new(Geometry::Polygon {
                    exterior: points,
                    holes: Vec::new(),
                })
                .with_attribute("name", format!("footprint-{index}"))
                .with_attribute("kind", "footprint")
                .with_attribute("floors", rng.gen_range(1..=12_i64))
            }
        }
    }

    /// Generates a random-walk path of `count` (lat, lon) vertices.
    pub fn generate_path(&self, start: (f64, f64), count: usize, rng: &mut impl Rng) -> Vec<(f64, f64)> {
        let mut path = Vec::with_capacity(count);
        let mut current = start;
        path.push(current);

        // Random walk with some momentum to create natural-looking paths
        let mut heading = rng.gen_range(0.0..std::f64::consts::TAU);

        while path.len() < count {
            heading += rng.gen_range(-0.3..0.3);
            let step = self.config.point_spacing_m * rng.gen_range(0.8..1.2);

            // Rough approximation: 1 degree lat ≈ 111km, lon varies by latitude
            let lat_delta = (step * heading.cos()) / 111_000.0;
            let lon_delta = (step * heading.sin()) / (111_000.0 * current.0.to_radians().cos());

            let (next_lat, next_lon, bounced_heading) =
                self.apply_bounds(current.0 + lat_delta, current.1 + lon_delta, heading);
            heading = bounced_heading;

            current = (next_lat, next_lon);
            path.push(current);
        }

        path
    }

    /// Generates a jittered ring of `count` vertices around `center`.
    fn generate_ring(&self, center: (f64, f64), count: usize, rng: &mut impl Rng) -> Vec<(f64, f64)> {
        let (min_r, max_r) = ordered(self.config.polygon_radius_m.0, self.config.polygon_radius_m.1);
        let radius = if max_r > min_r { rng.gen_range(min_r..max_r) } else { min_r };
        let lon_scale = 111_000.0 * center.0.to_radians().cos();

        (0..count)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / count as f64;
                let r = radius * rng.gen_range(0.85..1.15);
                let (lat, lon, _) = self.apply_bounds(
                    center.0 + r * angle.cos() / 111_000.0,
                    center.1 + r * angle.sin() / lon_scale,
                    angle,
                );
                (lat, lon)
            })
            .collect()
    }

    /// Applies bounds checking with heading reversal.
    fn apply_bounds(&self, lat: f64, lon: f64, heading: f64) -> (f64, f64, f64) {
        let b = &self.config.bounds;
        let mut new_heading = heading;

        let lat = if lat < b.min_lat {
            new_heading = std::f64::consts::PI - heading;
            b.min_lat + (b.min_lat - lat).min(0.001)
        } else if lat > b.max_lat {
            new_heading = std::f64::consts::PI - heading;
            b.max_lat - (lat - b.max_lat).min(0.001)
        } else {
            lat
        };

        let lon = if lon < b.min_lon {
            new_heading = -heading;
            b.min_lon + (b.min_lon - lon).min(0.001)
        } else if lon > b.max_lon {
            new_heading = -heading;
            b.max_lon - (lon - b.max_lon).min(0.001)
        } else {
            lon
        };

        (lat, lon, new_heading)
    }

    /// Turns (lat, lon) vertices into points with a wandering Z inside the
    /// configured height range.
    fn apply_heights(&self, coords: &[(f64, f64)], rng: &mut impl Rng) -> Vec<Point3> {
        let (lo, hi) = ordered(self.config.height_range.0, self.config.height_range.1);
        let mut z = rng.gen_range(lo..=hi);

        coords
            .iter()
            .map(|&(lat, lon)| {
                let point = Point3::new(lon, lat, z);
                z = add_elevation_jitter(z, rng, self.config.height_step_m).clamp(lo, hi);
                point
            })
            .collect()
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if b < a { (b, a) } else { (a, b) }
}

/// Calculates the haversine distance between two points in meters.
fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}
