//! PostGIS-backed parcel store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{ParcelRow, ParcelStore, StoreError};
use crate::config::DatabaseConfig;
use crate::models::Coordinate;

// ST_MakePoint takes (x, y), i.e. $1 = longitude, $2 = latitude.
const CONTAINING_SQL: &str = r#"
    SELECT id, object_id, pin, state_code, block, lot, tract,
           owner_name, owner_address, situs_address, subdivision_code, legal_description,
           year_built, building_area, tax_year, tax_version, roll_correction_id,
           taxing_units, exemptions, market_area, county, created_at, updated_at,
           ST_AsGeoJSON(boundary) AS boundary_geojson,
           NULL::float8 AS distance_meters
    FROM parcels
    WHERE ST_Contains(boundary, ST_SetSRID(ST_MakePoint($1, $2), 4326))
    LIMIT 1
"#;

// Casting to geography makes ST_DWithin/ST_Distance ellipsoidal and in meters.
const WITHIN_SQL: &str = r#"
    SELECT id, object_id, pin, state_code, block, lot, tract,
           owner_name, owner_address, situs_address, subdivision_code, legal_description,
           year_built, building_area, tax_year, tax_version, roll_correction_id,
           taxing_units, exemptions, market_area, county, created_at, updated_at,
           ST_AsGeoJSON(boundary) AS boundary_geojson,
           ST_Distance(
               boundary::geography,
               ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography
           ) AS distance_meters
    FROM parcels
    WHERE ST_DWithin(
        boundary::geography,
        ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography,
        $3
    )
    ORDER BY distance_meters ASC
    LIMIT $4
"#;

/// Open a connection pool with the configured limits
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        "Connecting to PostGIS (max {} connections)...",
        config.max_connections
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .connect(&config.url)
        .await
}

/// Parcel store over a `parcels` table with a `geometry(MultiPolygon, 4326)`
/// `boundary` column.
#[derive(Clone)]
pub struct PgParcelStore {
    pool: PgPool,
}

impl PgParcelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check that the database answers
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl ParcelStore for PgParcelStore {
    async fn query_containing(&self, point: Coordinate) -> Result<Option<ParcelRow>, StoreError> {
        debug!("containment query at {}", point);

        let row = sqlx::query_as::<_, ParcelRow>(CONTAINING_SQL)
            .bind(point.longitude)
            .bind(point.latitude)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn query_within(
        &self,
        point: Coordinate,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<ParcelRow>, StoreError> {
        debug!("radius query at {} within {}m", point, radius_meters);

        let rows = sqlx::query_as::<_, ParcelRow>(WITHIN_SQL)
            .bind(point.longitude)
            .bind(point.latitude)
            .bind(radius_meters)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
