//! Core data models for parcel queries.

pub mod coordinate;
pub mod parcel;

pub use coordinate::{Axis, Coordinate, CoordinateError, LATITUDE_RANGE, LONGITUDE_RANGE};
pub use parcel::{Parcel, ParcelWithDistance, DEFAULT_COUNTY};
