//! Spatial references: a horizontal reference paired with a vertical datum.
//!
//! Feature data and terrain data each carry their own [`SpatialReference`].
//! Reconciling the two comes down to two questions: do they share a vertical
//! datum ([`SpatialReference::is_vert_equivalent_to`]), and where does a point
//! land when moved from one to the other ([`SpatialReference::transform`]).

use std::{f64::consts::FRAC_PI_4, fmt, str::FromStr, sync::Arc};

use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::Point3;

/// WGS84 semi-major axis in meters, used as the spherical mercator radius.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude at which spherical mercator becomes a square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SrsError {
    #[error("Unknown horizontal reference: {0}")]
    UnknownHorizontal(String),

    #[error("Non-finite coordinate ({x}, {y}, {z})")]
    NonFinite { x: f64, y: f64, z: f64 },

    #[error("Latitude {0} is outside the spherical mercator domain")]
    OutsideMercator(f64),

    #[error("Invalid geoid grid: {0}")]
    InvalidGeoid(String),
}

/// The horizontal half of a spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HorizontalRef {
    /// WGS84 longitude/latitude in degrees.
    Geographic,
    /// EPSG:3857, meters.
    SphericalMercator,
}

impl HorizontalRef {
    fn to_geographic(self, c: Coord<f64>) -> Result<Coord<f64>, SrsError> {
        match self {
            HorizontalRef::Geographic => Ok(c),
            HorizontalRef::SphericalMercator => {
                let lon = (c.x / MERCATOR_RADIUS).to_degrees();
                let lat = (2.0 * (c.y / MERCATOR_RADIUS).exp().atan() - 2.0 * FRAC_PI_4)
                    .to_degrees();
                Ok(Coord { x: lon, y: lat })
            }
        }
    }

    fn project(self, c: Coord<f64>) -> Result<Coord<f64>, SrsError> {
        match self {
            HorizontalRef::Geographic => Ok(c),
            HorizontalRef::SphericalMercator => {
                if c.y.abs() > MERCATOR_MAX_LAT {
                    return Err(SrsError::OutsideMercator(c.y));
                }
                let x = MERCATOR_RADIUS * c.x.to_radians();
                let y = MERCATOR_RADIUS * (FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln();
                Ok(Coord { x, y })
            }
        }
    }

    pub fn init_string(self) -> &'static str {
        match self {
            HorizontalRef::Geographic => "wgs84",
            HorizontalRef::SphericalMercator => "spherical-mercator",
        }
    }
}

impl FromStr for HorizontalRef {
    type Err = SrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wgs84" | "epsg:4326" | "geographic" => Ok(HorizontalRef::Geographic),
            "spherical-mercator" | "epsg:3857" | "epsg:900913" => {
                Ok(HorizontalRef::SphericalMercator)
            }
            other => Err(SrsError::UnknownHorizontal(other.to_string())),
        }
    }
}

/// A geoid model: undulation of the geoid above the ellipsoid, on a regular
/// longitude/latitude grid.
///
/// Row 0 is the southern edge. Lookups outside the grid clamp to the nearest
/// edge.
#[derive(Debug, Clone)]
pub struct Geoid {
    name: String,
    west: f64,
    south: f64,
    /// Grid spacing in degrees.
    step: f64,
    cols: usize,
    rows: usize,
    undulations: Vec<f64>,
}

impl Geoid {
    /// A geoid with the same undulation everywhere.
    pub fn constant(name: impl Into<String>, undulation: f64) -> Self {
        Self {
            name: name.into(),
            west: -180.0,
            south: -90.0,
            step: 360.0,
            cols: 1,
            rows: 1,
            undulations: vec![undulation],
        }
    }

    pub fn from_grid(
        name: impl Into<String>,
        west: f64,
        south: f64,
        step: f64,
        cols: usize,
        undulations: Vec<f64>,
    ) -> Result<Self, SrsError> {
        if step.is_nan() || step <= 0.0 {
            return Err(SrsError::InvalidGeoid(format!("step must be positive, got {step}")));
        }
        if cols == 0 || undulations.is_empty() || undulations.len() % cols != 0 {
            return Err(SrsError::InvalidGeoid(format!(
                "{} values do not fill rows of {cols} columns",
                undulations.len()
            )));
        }
        let rows = undulations.len() / cols;
        Ok(Self {
            name: name.into(),
            west,
            south,
            step,
            cols,
            rows,
            undulations,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geoid height above the ellipsoid at a geographic location, bilinearly
    /// interpolated.
    pub fn undulation(&self, lon: f64, lat: f64) -> f64 {
        let fx = ((lon - self.west) / self.step).clamp(0.0, (self.cols - 1) as f64);
        let fy = ((lat - self.south) / self.step).clamp(0.0, (self.rows - 1) as f64);

        let c0 = fx.floor() as usize;
        let r0 = fy.floor() as usize;
        let c1 = (c0 + 1).min(self.cols - 1);
        let r1 = (r0 + 1).min(self.rows - 1);
        let tx = fx - c0 as f64;
        let ty = fy - r0 as f64;

        let at = |c: usize, r: usize| self.undulations[r * self.cols + c];
        let south = at(c0, r0) * (1.0 - tx) + at(c1, r0) * tx;
        let north = at(c0, r1) * (1.0 - tx) + at(c1, r1) * tx;
        south * (1.0 - ty) + north * ty
    }
}

/// The surface that Z = 0 refers to.
#[derive(Debug, Clone, Default)]
pub enum VerticalDatum {
    /// Height above the WGS84 ellipsoid.
    #[default]
    Ellipsoid,
    /// Orthometric height above a geoid model.
    Geoid(Arc<Geoid>),
}

impl VerticalDatum {
    pub fn geoid(geoid: Geoid) -> Self {
        VerticalDatum::Geoid(Arc::new(geoid))
    }

    pub fn name(&self) -> &str {
        match self {
            VerticalDatum::Ellipsoid => "ellipsoid",
            VerticalDatum::Geoid(g) => g.name(),
        }
    }

    fn ellipsoidal_height(&self, at: Coord<f64>, z: f64) -> f64 {
        match self {
            VerticalDatum::Ellipsoid => z,
            VerticalDatum::Geoid(g) => z + g.undulation(at.x, at.y),
        }
    }

    fn height_from_ellipsoidal(&self, at: Coord<f64>, z: f64) -> f64 {
        match self {
            VerticalDatum::Ellipsoid => z,
            VerticalDatum::Geoid(g) => z - g.undulation(at.x, at.y),
        }
    }
}

/// Datums are identified by name.
impl PartialEq for VerticalDatum {
    fn eq(&self, other: &Self) -> bool {
        self.name().eq_ignore_ascii_case(other.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialReference {
    horizontal: HorizontalRef,
    vertical: VerticalDatum,
}

impl SpatialReference {
    pub fn new(horizontal: HorizontalRef, vertical: VerticalDatum) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn wgs84() -> Self {
        Self::new(HorizontalRef::Geographic, VerticalDatum::Ellipsoid)
    }

    pub fn spherical_mercator() -> Self {
        Self::new(HorizontalRef::SphericalMercator, VerticalDatum::Ellipsoid)
    }

    /// Builds a reference from a horizontal init string such as `"epsg:4326"`,
    /// with heights above the ellipsoid.
    pub fn from_init(horizontal: &str) -> Result<Self, SrsError> {
        Ok(Self::new(horizontal.parse()?, VerticalDatum::Ellipsoid))
    }

    pub fn with_vertical(mut self, vertical: VerticalDatum) -> Self {
        self.vertical = vertical;
        self
    }

    pub fn horizontal(&self) -> HorizontalRef {
        self.horizontal
    }

    pub fn vertical(&self) -> &VerticalDatum {
        &self.vertical
    }

    /// The geographic counterpart of this reference. The vertical datum is kept.
    pub fn geographic(&self) -> Self {
        Self::new(HorizontalRef::Geographic, self.vertical.clone())
    }

    pub fn is_horiz_equivalent_to(&self, other: &SpatialReference) -> bool {
        self.horizontal == other.horizontal
    }

    pub fn is_vert_equivalent_to(&self, other: &SpatialReference) -> bool {
        self.vertical == other.vertical
    }

    pub fn is_equivalent_to(&self, other: &SpatialReference) -> bool {
        self.is_horiz_equivalent_to(other) && self.is_vert_equivalent_to(other)
    }

    /// Moves a point from this reference into `target`.
    ///
    /// Vertical correction goes through the ellipsoid, evaluated at the point's
    /// geographic location.
    pub fn transform(&self, point: Point3, target: &SpatialReference) -> Result<Point3, SrsError> {
        if !point.is_finite() {
            return Err(SrsError::NonFinite {
                x: point.x,
                y: point.y,
                z: point.z,
            });
        }
        if self.is_equivalent_to(target) {
            return Ok(point);
        }

        let geo = self.horizontal.to_geographic(point.xy())?;
        let z = if self.is_vert_equivalent_to(target) {
            point.z
        } else {
            let ellipsoidal = self.vertical.ellipsoidal_height(geo, point.z);
            target.vertical.height_from_ellipsoidal(geo, ellipsoidal)
        };
        let xy = target.horizontal.project(geo)?;

        Ok(Point3::new(xy.x, xy.y, z))
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.horizontal.init_string(), self.vertical.name())
    }
}
