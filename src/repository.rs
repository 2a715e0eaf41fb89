//! Parcel repository: runs the spatial queries and maps rows to parcels.
//!
//! "No parcel at this point" is `Ok(None)` here, not an error. Turning that
//! into a caller-facing not-found is the service's decision.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::geometry::{decode_multi_polygon, GeometryError};
use crate::models::{Coordinate, Parcel, ParcelWithDistance, DEFAULT_COUNTY};
use crate::store::{ParcelRow, ParcelStore, QueryContext, StoreError};

/// Upper bound on rows returned by a radius query
pub const MAX_NEARBY_RESULTS: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{operation} at {point}{radius} failed: {source}", radius = within(.radius_meters))]
    Store {
        operation: &'static str,
        point: Coordinate,
        radius_meters: Option<f64>,
        #[source]
        source: StoreError,
    },

    #[error("parcel {parcel_id} has an unreadable boundary: {source}")]
    Geometry {
        parcel_id: i64,
        #[source]
        source: GeometryError,
    },

    #[error("parcel {parcel_id} was returned by a radius query without a distance")]
    MissingDistance { parcel_id: i64 },
}

fn within(radius_meters: &Option<f64>) -> String {
    radius_meters
        .map(|radius| format!(" within {radius}m"))
        .unwrap_or_default()
}

impl RepositoryError {
    /// True when the store call was cancelled or ran past its deadline
    pub fn is_cancellation(&self) -> bool {
        match self {
            RepositoryError::Store { source, .. } => source.is_cancellation(),
            RepositoryError::Geometry { .. } | RepositoryError::MissingDistance { .. } => false,
        }
    }
}

#[async_trait]
pub trait ParcelRepository: Send + Sync {
    /// The parcel whose boundary contains `point`, or `None`
    async fn find_containing(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
    ) -> Result<Option<Parcel>, RepositoryError>;

    /// Parcels within `radius_meters` of `point`, nearest first.
    ///
    /// Never returns more than [`MAX_NEARBY_RESULTS`]; no match is an empty vec.
    async fn find_within(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<ParcelWithDistance>, RepositoryError>;
}

/// Repository over any [`ParcelStore`]
pub struct StoreParcelRepository<S> {
    store: Arc<S>,
}

impl<S: ParcelStore> StoreParcelRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: ParcelStore + 'static> ParcelRepository for StoreParcelRepository<S> {
    async fn find_containing(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
    ) -> Result<Option<Parcel>, RepositoryError> {
        let row = ctx
            .run(self.store.query_containing(point))
            .await
            .map_err(|source| RepositoryError::Store {
                operation: "containment query",
                point,
                radius_meters: None,
                source,
            })?;

        let Some(row) = row else {
            debug!("No parcel contains {}", point);
            return Ok(None);
        };

        let (parcel, _) = into_parcel(row)?;
        Ok(Some(parcel))
    }

    async fn find_within(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<ParcelWithDistance>, RepositoryError> {
        let rows = ctx
            .run(
                self.store
                    .query_within(point, radius_meters, MAX_NEARBY_RESULTS),
            )
            .await
            .map_err(|source| RepositoryError::Store {
                operation: "radius query",
                point,
                radius_meters: Some(radius_meters),
                source,
            })?;

        debug!(
            "Radius query at {} within {}m returned {} rows",
            point,
            radius_meters,
            rows.len()
        );

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let (parcel, distance) = into_parcel(row)?;
            let Some(distance) = distance else {
                error!("Parcel {} has no distance in radius query results", parcel.id);
                return Err(RepositoryError::MissingDistance {
                    parcel_id: parcel.id,
                });
            };
            results.push(ParcelWithDistance {
                parcel,
                distance_meters: distance.max(0.0),
            });
        }

        // Backends already order by distance; keep the guarantee local.
        results.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        results.truncate(MAX_NEARBY_RESULTS as usize);

        Ok(results)
    }
}

/// Map a store row to a parcel plus its projected distance, if any
fn into_parcel(row: ParcelRow) -> Result<(Parcel, Option<f64>), RepositoryError> {
    let boundary = decode_multi_polygon(row.boundary_geojson.as_deref().map(str::as_bytes))
        .and_then(|geometry| {
            if geometry.is_empty() {
                Err(GeometryError::Empty)
            } else {
                Ok(geometry)
            }
        })
        .map_err(|source| {
            error!("Parcel {} has an unreadable boundary: {}", row.id, source);
            RepositoryError::Geometry {
                parcel_id: row.id,
                source,
            }
        })?;

    let county = if row.county.is_empty() {
        DEFAULT_COUNTY.to_string()
    } else {
        row.county
    };

    let parcel = Parcel {
        id: row.id,
        object_id: row.object_id,
        pin: row.pin,
        state_code: row.state_code,
        block: row.block,
        lot: row.lot,
        tract: row.tract,
        owner_name: row.owner_name,
        owner_address: row.owner_address,
        situs_address: row.situs_address,
        subdivision_code: row.subdivision_code,
        legal_description: row.legal_description,
        year_built: row.year_built,
        building_area: row.building_area,
        tax_year: row.tax_year,
        tax_version: row.tax_version,
        roll_correction_id: row.roll_correction_id,
        taxing_units: row.taxing_units,
        exemptions: row.exemptions,
        market_area: row.market_area,
        county,
        boundary,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };

    Ok((parcel, row.distance_meters))
}
