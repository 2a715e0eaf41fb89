//! Parcel boundary geometry in GeoJSON shape.
//!
//! Positions follow the GeoJSON convention of `[longitude, latitude]` on the
//! wire. In memory they are named fields so nothing downstream indexes into a
//! pair.

mod codec;

pub use codec::{decode_multi_polygon, decode_polygon, encode_multi_polygon, encode_polygon};

use geo::{Coord, LineString};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub(crate) const POLYGON: &str = "Polygon";
pub(crate) const MULTI_POLYGON: &str = "MultiPolygon";

/// Minimum positions in a closed, non-degenerate ring
pub const MIN_RING_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("malformed geometry JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected geometry type {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("position needs at least 2 values, got {len}")]
    InvalidPosition { len: usize },

    #[error("polygon {polygon} has no rings")]
    EmptyPolygon { polygon: usize },

    #[error("ring {ring} of polygon {polygon} has {len} positions, need at least 4")]
    DegenerateRing {
        polygon: usize,
        ring: usize,
        len: usize,
    },

    #[error("ring {ring} of polygon {polygon} is not closed")]
    OpenRing { polygon: usize, ring: usize },

    #[error("geometry has no polygons")]
    Empty,
}

/// A single `[longitude, latitude]` position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Position {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = GeometryError;

    // Altitude, if present, is dropped.
    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [longitude, latitude, ..] => Ok(Self::new(*longitude, *latitude)),
            _ => Err(GeometryError::InvalidPosition { len: values.len() }),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.longitude, p.latitude]
    }
}

impl From<Position> for Coord<f64> {
    fn from(p: Position) -> Self {
        Coord {
            x: p.longitude,
            y: p.latitude,
        }
    }
}

/// Closed sequence of positions; first equals last
pub type Ring = Vec<Position>;

/// Outer ring followed by zero or more holes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon(pub Vec<Ring>);

/// Canonical parcel boundary. Single-part parcels hold one polygon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        let mut rings = Vec::with_capacity(holes.len() + 1);
        rings.push(exterior);
        rings.extend(holes);
        Self(rings)
    }

    pub fn exterior(&self) -> Option<&Ring> {
        self.0.first()
    }

    pub fn holes(&self) -> &[Ring] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert for in-process spatial predicates
    pub fn to_geo(&self) -> Option<geo::Polygon<f64>> {
        let exterior = self.exterior()?;
        Some(geo::Polygon::new(
            to_line_string(exterior),
            self.holes().iter().map(to_line_string).collect(),
        ))
    }
}

fn to_line_string(ring: &Ring) -> LineString<f64> {
    LineString::new(ring.iter().copied().map(Coord::from).collect())
}

impl MultiPolygon {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self(polygons)
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the zero-value geometry, i.e. no polygons at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every ring is closed and non-degenerate.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.is_empty() {
            return Err(GeometryError::Empty);
        }

        for (pi, polygon) in self.0.iter().enumerate() {
            if polygon.is_empty() {
                return Err(GeometryError::EmptyPolygon { polygon: pi });
            }
            for (ri, ring) in polygon.0.iter().enumerate() {
                if ring.len() < MIN_RING_LEN {
                    return Err(GeometryError::DegenerateRing {
                        polygon: pi,
                        ring: ri,
                        len: ring.len(),
                    });
                }
                if ring.first() != ring.last() {
                    return Err(GeometryError::OpenRing {
                        polygon: pi,
                        ring: ri,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn to_geo(&self) -> geo::MultiPolygon<f64> {
        geo::MultiPolygon::new(self.0.iter().filter_map(Polygon::to_geo).collect())
    }
}

impl From<Polygon> for MultiPolygon {
    fn from(polygon: Polygon) -> Self {
        Self(vec![polygon])
    }
}

/// Wire shape shared by the store codec and the API serializers.
///
/// A missing `type` tag is tolerated; a wrong one is not.
#[derive(Deserialize)]
pub(crate) struct RawGeometry<C> {
    #[serde(rename = "type")]
    kind: Option<String>,
    coordinates: Option<C>,
}

impl<C: Default> RawGeometry<C> {
    pub(crate) fn into_coordinates(self, expected: &'static str) -> Result<C, GeometryError> {
        match self.kind {
            Some(kind) if kind != expected => Err(GeometryError::UnexpectedType {
                expected,
                found: kind,
            }),
            _ => Ok(self.coordinates.unwrap_or_default()),
        }
    }
}

#[derive(Serialize)]
struct TaggedGeometry<'a, C> {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: &'a C,
}

/// Serializes polygons as bare ring arrays for MultiPolygon coordinates
struct PolygonRings<'a>(&'a [Polygon]);

impl Serialize for PolygonRings<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|p| &p.0))
    }
}

impl Serialize for Polygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedGeometry {
            kind: POLYGON,
            coordinates: &self.0,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Polygon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawGeometry::<Vec<Ring>>::deserialize(deserializer)?
            .into_coordinates(POLYGON)
            .map(Polygon)
            .map_err(de::Error::custom)
    }
}

impl Serialize for MultiPolygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedGeometry {
            kind: MULTI_POLYGON,
            coordinates: &PolygonRings(&self.0),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MultiPolygon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawGeometry::<Vec<Vec<Ring>>>::deserialize(deserializer)?
            .into_coordinates(MULTI_POLYGON)
            .map(MultiPolygon::from_rings)
            .map_err(de::Error::custom)
    }
}

impl MultiPolygon {
    pub(crate) fn from_rings(polygons: Vec<Vec<Ring>>) -> Self {
        Self(polygons.into_iter().map(Polygon).collect())
    }
}
