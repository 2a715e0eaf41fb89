//! Parcels - point and radius lookups over a PostGIS parcel table
//!
//! This library provides the geometry codec, store adapters, repository and
//! validating service used by the `parcel-server` binary.

pub mod config;
pub mod geometry;
pub mod models;
pub mod repository;
pub mod service;
pub mod store;

pub use models::{Coordinate, Parcel, ParcelWithDistance};
pub use repository::{ParcelRepository, StoreParcelRepository};
pub use service::{ErrorKind, ParcelService, ServiceError};
pub use store::{ParcelStore, QueryContext};
