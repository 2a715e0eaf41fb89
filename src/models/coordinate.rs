//! WGS84 query coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid latitude range in degrees (inclusive)
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Valid longitude range in degrees (inclusive)
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// A query point in degrees.
///
/// Axes are addressed by name only. Store adapters bind `longitude` before
/// `latitude`; GeoJSON positions put longitude first as well. Nothing else
/// in the crate should care about positional order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Which axis of a [`Coordinate`] was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Latitude => write!(f, "latitude"),
            Axis::Longitude => write!(f, "longitude"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{axis} {value} is outside [{min}, {max}]")]
pub struct CoordinateError {
    pub axis: Axis,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check both axes against their WGS84 bounds.
    ///
    /// Latitude is checked first. NaN never passes.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        check(Axis::Latitude, self.latitude, LATITUDE_RANGE)?;
        check(Axis::Longitude, self.longitude, LONGITUDE_RANGE)
    }
}

fn check(axis: Axis, value: f64, (min, max): (f64, f64)) -> Result<(), CoordinateError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CoordinateError {
            axis,
            value,
            min,
            max,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lat {}, lng {})", self.latitude, self.longitude)
    }
}
