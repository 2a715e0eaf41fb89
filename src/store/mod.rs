//! Spatial record store adapters.
//!
//! A store answers the two raw spatial questions and hands back flat rows.
//! It performs no validation and knows nothing about the domain types beyond
//! column names; mapping rows to [`Parcel`] is the repository's job.

mod context;
mod memory;
mod postgres;

pub use context::QueryContext;
pub use memory::InMemoryParcelStore;
pub use postgres::{connect, PgParcelStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::geometry::{encode_multi_polygon, GeometryError};
use crate::models::{Coordinate, Parcel};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,
}

impl StoreError {
    /// True when the call was aborted by the caller rather than failing
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Cancelled | StoreError::DeadlineExceeded)
    }
}

/// One row of the `parcels` table as projected by the query templates.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ParcelRow {
    pub id: i64,
    pub object_id: i64,
    pub pin: String,
    pub state_code: Option<String>,
    pub block: Option<String>,
    pub lot: Option<String>,
    pub tract: Option<String>,
    pub owner_name: Option<String>,
    pub owner_address: Option<String>,
    pub situs_address: Option<String>,
    pub subdivision_code: Option<String>,
    pub legal_description: Option<String>,
    pub year_built: Option<i32>,
    pub building_area: Option<f64>,
    pub tax_year: Option<i32>,
    pub tax_version: Option<String>,
    pub roll_correction_id: Option<String>,
    pub taxing_units: Option<String>,
    pub exemptions: Option<String>,
    pub market_area: Option<String>,
    pub county: String,
    /// `ST_AsGeoJSON(boundary)`
    pub boundary_geojson: Option<String>,
    /// Only populated by radius queries
    pub distance_meters: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParcelRow {
    /// Project a parcel the way the store would return it
    pub fn from_parcel(parcel: &Parcel) -> Result<Self, GeometryError> {
        Ok(Self {
            id: parcel.id,
            object_id: parcel.object_id,
            pin: parcel.pin.clone(),
            state_code: parcel.state_code.clone(),
            block: parcel.block.clone(),
            lot: parcel.lot.clone(),
            tract: parcel.tract.clone(),
            owner_name: parcel.owner_name.clone(),
            owner_address: parcel.owner_address.clone(),
            situs_address: parcel.situs_address.clone(),
            subdivision_code: parcel.subdivision_code.clone(),
            legal_description: parcel.legal_description.clone(),
            year_built: parcel.year_built,
            building_area: parcel.building_area,
            tax_year: parcel.tax_year,
            tax_version: parcel.tax_version.clone(),
            roll_correction_id: parcel.roll_correction_id.clone(),
            taxing_units: parcel.taxing_units.clone(),
            exemptions: parcel.exemptions.clone(),
            market_area: parcel.market_area.clone(),
            county: parcel.county.clone(),
            boundary_geojson: encode_multi_polygon(&parcel.boundary)?,
            distance_meters: None,
            created_at: parcel.created_at,
            updated_at: parcel.updated_at,
        })
    }
}

/// Read-only spatial queries over parcel boundaries.
///
/// Implementations take the point by axis name and are responsible for
/// binding `longitude` before `latitude` wherever the backend expects it.
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// First parcel whose boundary contains `point`, if any
    async fn query_containing(&self, point: Coordinate) -> Result<Option<ParcelRow>, StoreError>;

    /// Parcels whose boundary lies within `radius_meters` of `point`,
    /// nearest first, at most `limit` rows
    async fn query_within(
        &self,
        point: Coordinate,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<ParcelRow>, StoreError>;
}
