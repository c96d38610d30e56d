//! Features, their geometry and their attribute store.

use std::collections::BTreeMap;

use geo::{Coord, LineString, MultiPoint, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::expression::NumericExpression;

/// A 3-D vertex. X/Y are in the feature's horizontal reference, Z in its
/// vertical datum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<(f64, f64, f64)> for Point3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Coord<f64>> for Point3 {
    fn from(c: Coord<f64>) -> Self {
        Self::new(c.x, c.y, 0.0)
    }
}

/// Feature geometry. Every shape reduces to one or more parts, each an ordered
/// run of vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Points(Vec<Point3>),
    LineString(Vec<Point3>),
    Ring(Vec<Point3>),
    Polygon {
        exterior: Vec<Point3>,
        #[serde(default)]
        holes: Vec<Vec<Point3>>,
    },
    Multi(Vec<Geometry>),
}

impl Geometry {
    /// All parts in depth-first order: a polygon's exterior precedes its holes,
    /// multi-geometry members keep their order.
    pub fn parts(&self) -> Vec<&[Point3]> {
        let mut out = Vec::new();
        self.collect_parts(&mut out);
        out
    }

    fn collect_parts<'a>(&'a self, out: &mut Vec<&'a [Point3]>) {
        match self {
            Geometry::Points(p) | Geometry::LineString(p) | Geometry::Ring(p) => out.push(p),
            Geometry::Polygon { exterior, holes } => {
                out.push(exterior);
                out.extend(holes.iter().map(Vec::as_slice));
            }
            Geometry::Multi(members) => {
                for member in members {
                    member.collect_parts(out);
                }
            }
        }
    }

    /// Mutable counterpart of [`Geometry::parts`], same order.
    pub fn parts_mut(&mut self) -> Vec<&mut [Point3]> {
        let mut out = Vec::new();
        self.collect_parts_mut(&mut out);
        out
    }

    fn collect_parts_mut<'a>(&'a mut self, out: &mut Vec<&'a mut [Point3]>) {
        match self {
            Geometry::Points(p) | Geometry::LineString(p) | Geometry::Ring(p) => out.push(p),
            Geometry::Polygon { exterior, holes } => {
                out.push(exterior);
                out.extend(holes.iter_mut().map(Vec::as_mut_slice));
            }
            Geometry::Multi(members) => {
                for member in members {
                    member.collect_parts_mut(out);
                }
            }
        }
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Point3> {
        self.parts().into_iter().flat_map(|part| part.iter())
    }

    pub fn vertex_count(&self) -> usize {
        self.parts().iter().map(|part| part.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Horizontal bounds of all vertices.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let mut vertices = self.vertices();
        let first = vertices.next()?.xy();
        let (min, max) = vertices.fold((first, first), |(min, max), p| {
            (
                Coord {
                    x: min.x.min(p.x),
                    y: min.y.min(p.y),
                },
                Coord {
                    x: max.x.max(p.x),
                    y: max.y.max(p.y),
                },
            )
        });
        Some(Rect::new(min, max))
    }

    /// A 2-D view of this geometry for use with the `geo` algorithms. Z is
    /// dropped.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        fn line(points: &[Point3]) -> LineString<f64> {
            points.iter().map(Point3::xy).collect()
        }

        match self {
            Geometry::Points(p) => {
                geo::Geometry::MultiPoint(MultiPoint::from(
                    p.iter().map(Point3::xy).collect::<Vec<_>>(),
                ))
            }
            Geometry::LineString(p) => geo::Geometry::LineString(line(p)),
            Geometry::Ring(p) => {
                let mut ring = line(p);
                ring.close();
                geo::Geometry::LineString(ring)
            }
            Geometry::Polygon { exterior, holes } => geo::Geometry::Polygon(geo::Polygon::new(
                line(exterior),
                holes.iter().map(|h| line(h)).collect(),
            )),
            Geometry::Multi(members) => geo::Geometry::GeometryCollection(
                members.iter().map(Geometry::to_geo).collect(),
            ),
        }
    }
}

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value. Strings are parsed; unparsable strings have
    /// no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Uuid,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry: Some(geometry),
            attributes: BTreeMap::new(),
        }
    }

    /// A feature with no geometry at all.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Writes an attribute, replacing any previous value under the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(AttributeValue::as_f64)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        self.geometry.as_mut()
    }

    /// Evaluates a numeric expression against this feature's attributes.
    pub fn eval(&self, expr: &NumericExpression) -> f64 {
        expr.eval(|name| self.get_double(name))
    }
}
