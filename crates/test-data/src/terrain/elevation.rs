//! Perlin noise-based synthetic terrain.

use altitude::elevation::{HeightSource, SampleError};
use geo::Coord;
use noise::{NoiseFn, Perlin};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::BoundingBox;

/// Generates realistic elevation data using Perlin noise.
///
/// Multiple octaves of noise give natural-looking terrain with both
/// large-scale features and small-scale variation. Coordinates are geographic
/// degrees, so the generator serves as a terrain layer for a WGS84 map.
#[derive(Debug, Clone)]
pub struct ElevationGenerator {
    name: String,
    perlin: Perlin,
    /// Base elevation in meters (e.g., valley floor).
    base_elevation: f64,
    /// Scale factor for terrain height variation.
    height_scale: f64,
    /// Spatial frequency of the first octave, in cycles per degree.
    frequency: f64,
    /// Number of noise octaves for detail.
    octaves: u32,
    /// Where the terrain has data. Unbounded when `None`.
    bounds: Option<BoundingBox>,
}

impl ElevationGenerator {
    /// Creates a new elevation generator with default settings.
    pub fn new(seed: u32) -> Self {
        Self {
            name: format!("perlin-{seed}"),
            perlin: Perlin::new(seed),
            base_elevation: 1500.0, // Reasonable base for mountain terrain
            height_scale: 500.0,    // ±500m variation
            frequency: 4.0,         // ~28km wavelength
            octaves: 4,
            bounds: None,
        }
    }

    /// Creates a generator configured for the Reno/Tahoe region.
    ///
    /// Higher base elevation and larger height scale for Sierra Nevada terrain.
    pub fn reno_tahoe(seed: u32) -> Self {
        Self {
            base_elevation: 1900.0, // Lake Tahoe elevation ~1900m
            height_scale: 800.0,    // Significant mountain terrain
            frequency: 3.0,
            octaves: 5,
            ..Self::new(seed)
        }
    }

    /// Creates a generator configured for the Boulder, CO region.
    pub fn boulder(seed: u32) -> Self {
        Self {
            base_elevation: 1650.0, // Boulder elevation ~1650m
            height_scale: 600.0,    // Foothills terrain
            ..Self::new(seed)
        }
    }

    /// Creates a generator for relatively flat terrain (rolling hills).
    pub fn flat(seed: u32) -> Self {
        Self {
            base_elevation: 300.0,
            height_scale: 50.0, // Minimal variation
            frequency: 8.0,
            octaves: 2,
            ..Self::new(seed)
        }
    }

    /// Sets the base elevation.
    pub fn with_base_elevation(mut self, elevation: f64) -> Self {
        self.base_elevation = elevation;
        self
    }

    /// Sets the height scale (variation amplitude).
    pub fn with_height_scale(mut self, scale: f64) -> Self {
        self.height_scale = scale;
        self
    }

    /// Sets the spatial frequency in cycles per degree.
    pub fn with_frequency(mut self, freq: f64) -> Self {
        self.frequency = freq;
        self
    }

    pub fn with_octaves(mut self, octaves: u32) -> Self {
        self.octaves = octaves.max(1);
        self
    }

    /// Restricts the terrain to a bounding box; outside it there is no data.
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn base_elevation(&self) -> f64 {
        self.base_elevation
    }

    pub fn height_scale(&self) -> f64 {
        self.height_scale
    }

    /// Wavelength of one octave, in degrees.
    fn wavelength(&self, octave: u32) -> f64 {
        1.0 / (self.frequency * 2f64.powi(octave as i32))
    }

    /// Number of octaves whose detail survives sampling at `resolution`.
    /// At least one octave is always kept.
    fn octaves_for(&self, resolution: f64) -> u32 {
        if resolution <= 0.0 {
            return self.octaves;
        }
        (1..self.octaves)
            .take_while(|o| self.wavelength(*o) >= 2.0 * resolution)
            .count() as u32
            + 1
    }

    fn fbm(&self, lat: f64, lon: f64, octaves: u32) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves {
            let noise_val = self.perlin.get([lat * frequency, lon * frequency]);
            total += noise_val * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5; // Each octave has half the amplitude
            frequency *= 2.0; // Each octave has double the frequency
        }

        // Normalize and scale
        let normalized = total / max_amplitude; // Range: -1 to 1
        self.base_elevation + (normalized * self.height_scale)
    }

    /// Gets elevation at a given lat/lon coordinate.
    ///
    /// Uses fractal Brownian motion (fBm) for natural terrain appearance.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        self.fbm(lat, lon, self.octaves)
    }
}

impl HeightSource for ElevationGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_resolution(&self) -> f64 {
        self.wavelength(self.octaves - 1) / 4.0
    }

    fn height_at(&self, coord: Coord<f64>, resolution: f64) -> Result<Option<f64>, SampleError> {
        let (lat, lon) = (coord.y, coord.x);
        if !lat.is_finite() || !lon.is_finite() {
            return Ok(None);
        }
        if let Some(b) = &self.bounds {
            if !b.contains(lat, lon) {
                return Ok(None);
            }
        }
        Ok(Some(self.fbm(lat, lon, self.octaves_for(resolution))))
    }
}

/// Utility to add random jitter to a height reading.
///
/// Real GPS devices have elevation accuracy of ±3-20m depending on conditions.
/// A negative or NaN deviation leaves the height unchanged.
pub fn add_elevation_jitter(elevation: f64, rng: &mut impl Rng, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) => elevation + normal.sample(rng),
        Err(_) => elevation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_elevation_consistency() {
        let elev_gen = ElevationGenerator::new(42);
        let elev1 = elev_gen.elevation_at(39.5, -119.8);
        let elev2 = elev_gen.elevation_at(39.5, -119.8);
        assert!((elev1 - elev2).abs() < 0.001);
    }

    #[test]
    fn test_elevation_range() {
        let elev_gen = ElevationGenerator::new(42);
        let elev = elev_gen.elevation_at(39.5, -119.8);
        // Should be within base ± scale
        assert!(elev > elev_gen.base_elevation - elev_gen.height_scale);
        assert!(elev < elev_gen.base_elevation + elev_gen.height_scale);
    }

    #[test]
    fn test_height_source_matches_full_detail() {
        let elev_gen = ElevationGenerator::boulder(7);
        let at = Coord { x: -105.3, y: 40.0 };
        let h = elev_gen.height_at(at, 0.0).unwrap();
        assert_eq!(h, Some(elev_gen.elevation_at(40.0, -105.3)));
    }

    #[test]
    fn test_coarse_resolution_drops_octaves() {
        let elev_gen = ElevationGenerator::new(1).with_frequency(1.0).with_octaves(4);
        // Wavelengths: 1, 0.5, 0.25, 0.125 degrees.
        assert_eq!(elev_gen.octaves_for(0.0), 4);
        assert_eq!(elev_gen.octaves_for(0.06), 4);
        assert_eq!(elev_gen.octaves_for(0.1), 3);
        assert_eq!(elev_gen.octaves_for(0.3), 1);
        assert_eq!(elev_gen.octaves_for(10.0), 1);
        assert_eq!(elev_gen.native_resolution(), 0.125 / 4.0);
    }

    #[test]
    fn test_bounds_limit_data() {
        let elev_gen = ElevationGenerator::boulder(3).with_bounds(BoundingBox::new(39.9, -105.5, 40.1, -105.2));
        assert!(elev_gen.height_at(Coord { x: -105.3, y: 40.0 }, 0.0).unwrap().is_some());
        assert_eq!(elev_gen.height_at(Coord { x: -100.0, y: 40.0 }, 0.0).unwrap(), None);
        assert_eq!(elev_gen.height_at(Coord { x: f64::NAN, y: 40.0 }, 0.0).unwrap(), None);
    }

    #[test]
    fn test_jitter() {
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(add_elevation_jitter(100.0, &mut rng, -1.0), 100.0);
        let jittered = add_elevation_jitter(100.0, &mut rng, 5.0);
        assert!((jittered - 100.0).abs() < 50.0);
    }
}
