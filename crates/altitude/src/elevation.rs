//! Terrain elevation sampling.
//!
//! [`ElevationSampler`] is the contract the resolver consumes: one batched call
//! per run of vertices, one optional height per vertex. [`ElevationQuery`] is
//! the implementation bound to a [`MapFrame`], asking its layers from the top
//! down. Layers provide heights through [`HeightSource`]; [`Heightfield`] is
//! the regular-grid source.

use std::fmt;

use geo::{Coord, Rect};
use thiserror::Error;
use tracing::trace;

use crate::{feature::Point3, session::MapFrame, srs::SpatialReference};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Invalid heightfield: {0}")]
    InvalidHeightfield(String),

    #[error("Height source '{name}' failed: {message}")]
    Source { name: String, message: String },
}

/// Batched terrain height lookup.
pub trait ElevationSampler {
    /// Samples the terrain under each point, in input order. `None` marks a
    /// point with no terrain data. `max_resolution` caps the finest terrain
    /// resolution consulted, in map units; 0.0 means best available.
    fn get_elevations(
        &self,
        points: &[Point3],
        srs: &SpatialReference,
        max_resolution: f64,
    ) -> Result<Vec<Option<f64>>, SampleError>;

    /// Samples like [`ElevationSampler::get_elevations`] and writes each
    /// sampled height into the point's Z. Points without data keep their Z.
    fn clamp_elevations(
        &self,
        points: &mut [Point3],
        srs: &SpatialReference,
        max_resolution: f64,
    ) -> Result<Vec<Option<f64>>, SampleError> {
        let samples = self.get_elevations(points, srs, max_resolution)?;
        for (point, sample) in points.iter_mut().zip(&samples) {
            if let Some(z) = sample {
                point.z = *z;
            }
        }
        Ok(samples)
    }
}

/// A source of terrain heights in its map's spatial reference.
pub trait HeightSource: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Spacing of the source's own data, in map units.
    fn native_resolution(&self) -> f64;

    /// Height at a map coordinate, sampled no finer than `resolution` where
    /// the source supports it. `Ok(None)` means the source has no data there.
    fn height_at(&self, coord: Coord<f64>, resolution: f64) -> Result<Option<f64>, SampleError>;
}

/// A regular grid of heights. Row 0 lies along the southern (minimum y) edge.
#[derive(Debug, Clone)]
pub struct Heightfield {
    name: String,
    origin: Coord<f64>,
    cell_size: f64,
    cols: usize,
    rows: usize,
    heights: Vec<f64>,
    no_data: Option<f64>,
}

impl Heightfield {
    pub fn new(
        name: impl Into<String>,
        origin: Coord<f64>,
        cell_size: f64,
        cols: usize,
        heights: Vec<f64>,
    ) -> Result<Self, SampleError> {
        if cell_size.is_nan() || cell_size <= 0.0 {
            return Err(SampleError::InvalidHeightfield(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if cols < 2 || heights.len() % cols != 0 || heights.len() / cols < 2 {
            return Err(SampleError::InvalidHeightfield(format!(
                "{} heights do not form a grid of at least 2x2 with {cols} columns",
                heights.len()
            )));
        }

        let rows = heights.len() / cols;
        Ok(Self {
            name: name.into(),
            origin,
            cell_size,
            cols,
            rows,
            heights,
            no_data: None,
        })
    }

    /// Builds a grid by evaluating `f` at every post.
    pub fn from_fn(
        name: impl Into<String>,
        origin: Coord<f64>,
        cell_size: f64,
        cols: usize,
        rows: usize,
        f: impl Fn(Coord<f64>) -> f64,
    ) -> Result<Self, SampleError> {
        let mut heights = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                heights.push(f(Coord {
                    x: origin.x + col as f64 * cell_size,
                    y: origin.y + row as f64 * cell_size,
                }));
            }
        }
        Self::new(name, origin, cell_size, cols, heights)
    }

    /// Marks a sentinel height as "no data".
    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data = Some(value);
        self
    }

    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            self.origin,
            Coord {
                x: self.origin.x + (self.cols - 1) as f64 * self.cell_size,
                y: self.origin.y + (self.rows - 1) as f64 * self.cell_size,
            },
        )
    }

    fn post(&self, col: usize, row: usize) -> Option<f64> {
        let h = self.heights[row * self.cols + col];
        if h.is_nan() || self.no_data == Some(h) {
            None
        } else {
            Some(h)
        }
    }

    /// Bilinear interpolation between the four posts around `c`.
    fn bilinear(&self, c: Coord<f64>) -> Option<f64> {
        let fx = (c.x - self.origin.x) / self.cell_size;
        let fy = (c.y - self.origin.y) / self.cell_size;
        let max_x = (self.cols - 1) as f64;
        let max_y = (self.rows - 1) as f64;
        if !(0.0..=max_x).contains(&fx) || !(0.0..=max_y).contains(&fy) {
            return None;
        }

        let c0 = (fx.floor() as usize).min(self.cols - 2);
        let r0 = (fy.floor() as usize).min(self.rows - 2);
        let tx = fx - c0 as f64;
        let ty = fy - r0 as f64;

        let sw = self.post(c0, r0)?;
        let se = self.post(c0 + 1, r0)?;
        let nw = self.post(c0, r0 + 1)?;
        let ne = self.post(c0 + 1, r0 + 1)?;

        let south = sw * (1.0 - tx) + se * tx;
        let north = nw * (1.0 - tx) + ne * tx;
        Some(south * (1.0 - ty) + north * ty)
    }

    /// Samples on a coarser lattice of spacing `step` anchored at the origin,
    /// so detail finer than `step` does not show through.
    fn lattice(&self, c: Coord<f64>, step: f64) -> Option<f64> {
        let extent = self.extent();
        let snap = |v: f64, origin: f64, max: f64| {
            let lo = origin + ((v - origin) / step).floor() * step;
            (lo, (lo + step).min(max))
        };
        let (x0, x1) = snap(c.x, self.origin.x, extent.max().x);
        let (y0, y1) = snap(c.y, self.origin.y, extent.max().y);
        let tx = if x1 > x0 { (c.x - x0) / (x1 - x0) } else { 0.0 };
        let ty = if y1 > y0 { (c.y - y0) / (y1 - y0) } else { 0.0 };

        let sw = self.bilinear(Coord { x: x0, y: y0 })?;
        let se = self.bilinear(Coord { x: x1, y: y0 })?;
        let nw = self.bilinear(Coord { x: x0, y: y1 })?;
        let ne = self.bilinear(Coord { x: x1, y: y1 })?;

        let south = sw * (1.0 - tx) + se * tx;
        let north = nw * (1.0 - tx) + ne * tx;
        Some(south * (1.0 - ty) + north * ty)
    }
}

impl HeightSource for Heightfield {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_resolution(&self) -> f64 {
        self.cell_size
    }

    fn height_at(&self, coord: Coord<f64>, resolution: f64) -> Result<Option<f64>, SampleError> {
        if resolution > self.cell_size {
            if let Some(h) = self.lattice(coord, resolution) {
                return Ok(Some(h));
            }
        }
        Ok(self.bilinear(coord))
    }
}

/// Elevation sampling against the layers of one map frame.
///
/// Layers are consulted from the top of the stack down; the first layer with
/// data at a location wins. A frame without any layers is flat at 0.0 in the
/// map's vertical datum.
#[derive(Debug, Clone)]
pub struct ElevationQuery<'a> {
    frame: MapFrame<'a>,
}

impl<'a> ElevationQuery<'a> {
    pub fn new(frame: MapFrame<'a>) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &MapFrame<'a> {
        &self.frame
    }

    /// The terrain's spatial reference. Sampled heights are in its vertical
    /// datum.
    pub fn srs(&self) -> &SpatialReference {
        self.frame.srs()
    }

    /// Height at a coordinate already in the map's horizontal reference.
    pub fn elevation_at(
        &self,
        coord: Coord<f64>,
        resolution: f64,
    ) -> Result<Option<f64>, SampleError> {
        let layers = self.frame.layers();
        if layers.is_empty() {
            return Ok(Some(0.0));
        }
        for layer in layers.iter().rev() {
            if let Some(h) = layer.source().height_at(coord, resolution)? {
                return Ok(Some(h));
            }
        }
        Ok(None)
    }
}

impl ElevationSampler for ElevationQuery<'_> {
    fn get_elevations(
        &self,
        points: &[Point3],
        srs: &SpatialReference,
        max_resolution: f64,
    ) -> Result<Vec<Option<f64>>, SampleError> {
        points
            .iter()
            .map(|p| match srs.transform(*p, self.srs()) {
                Ok(map_point) => self.elevation_at(map_point.xy(), max_resolution),
                Err(e) => {
                    trace!(error = %e, "point has no location in the map reference");
                    Ok(None)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 grid over [0, 2] x [0, 2] where height = 10x + y.
    fn plane() -> Heightfield {
        Heightfield::from_fn("plane", Coord { x: 0.0, y: 0.0 }, 1.0, 3, 3, |c| {
            10.0 * c.x + c.y
        })
        .unwrap()
    }

    #[test]
    fn test_bilinear_on_plane_is_exact() {
        let hf = plane();
        let h = hf.height_at(Coord { x: 0.5, y: 1.5 }, 0.0).unwrap();
        assert_eq!(h, Some(6.5));

        let corner = hf.height_at(Coord { x: 2.0, y: 2.0 }, 0.0).unwrap();
        assert_eq!(corner, Some(22.0));
    }

    #[test]
    fn test_outside_extent_has_no_data() {
        let hf = plane();
        assert_eq!(hf.height_at(Coord { x: -0.1, y: 1.0 }, 0.0).unwrap(), None);
        assert_eq!(hf.height_at(Coord { x: 1.0, y: 2.5 }, 0.0).unwrap(), None);
        assert_eq!(hf.height_at(Coord { x: f64::NAN, y: 1.0 }, 0.0).unwrap(), None);
    }

    #[test]
    fn test_no_data_posts() {
        let hf = Heightfield::new(
            "holes",
            Coord { x: 0.0, y: 0.0 },
            1.0,
            2,
            vec![1.0, -9999.0, 1.0, 1.0],
        )
        .unwrap()
        .with_no_data(-9999.0);

        assert_eq!(hf.height_at(Coord { x: 0.5, y: 0.5 }, 0.0).unwrap(), None);
    }

    #[test]
    fn test_coarse_resolution_smooths_detail() {
        // A single spike in the middle of a flat 5x5 grid.
        let hf = Heightfield::from_fn("spike", Coord { x: 0.0, y: 0.0 }, 1.0, 5, 5, |c| {
            if c.x == 2.0 && c.y == 2.0 { 100.0 } else { 0.0 }
        })
        .unwrap();

        let center = Coord { x: 2.0, y: 2.0 };
        assert_eq!(hf.height_at(center, 0.0).unwrap(), Some(100.0));
        assert_eq!(hf.height_at(center, 4.0).unwrap(), Some(0.0));
    }

    #[test]
    fn test_invalid_grids_rejected() {
        let origin = Coord { x: 0.0, y: 0.0 };
        assert!(Heightfield::new("a", origin, 1.0, 1, vec![0.0; 4]).is_err());
        assert!(Heightfield::new("b", origin, 1.0, 2, vec![0.0; 3]).is_err());
        assert!(Heightfield::new("c", origin, 0.0, 2, vec![0.0; 4]).is_err());
        assert!(Heightfield::new("d", origin, 1.0, 4, vec![0.0; 4]).is_err());
    }

    #[derive(Debug)]
    struct Fixed(Vec<Option<f64>>);

    impl ElevationSampler for Fixed {
        fn get_elevations(
            &self,
            _points: &[Point3],
            _srs: &SpatialReference,
            _max_resolution: f64,
        ) -> Result<Vec<Option<f64>>, SampleError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_clamp_elevations_keeps_z_without_data() {
        let sampler = Fixed(vec![Some(50.0), None]);
        let mut points = vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 2.0)];

        let samples = sampler
            .clamp_elevations(&mut points, &SpatialReference::wgs84(), 0.0)
            .unwrap();

        assert_eq!(samples, vec![Some(50.0), None]);
        assert_eq!(points[0].z, 50.0);
        assert_eq!(points[1].z, 2.0);
    }
}
