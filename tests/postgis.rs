//! Containment and distance predicates against a real PostGIS database.
//!
//! Set `PARCELS_TEST_DATABASE_URL` to a database with the postgis extension
//! available; without it these tests return immediately.

use std::sync::Arc;

use parcels::config::DatabaseConfig;
use parcels::geometry::{encode_multi_polygon, Polygon, Position};
use parcels::store::{connect, PgParcelStore};
use parcels::{Coordinate, Parcel, ParcelService, QueryContext, ServiceError, StoreParcelRepository};
use sqlx::PgPool;

const SCHEMA: &str = r#"
    CREATE TEMP TABLE parcels (
        id bigint PRIMARY KEY,
        object_id bigint NOT NULL UNIQUE,
        pin text NOT NULL,
        state_code text, block text, lot text, tract text,
        owner_name text, owner_address text,
        situs_address text, subdivision_code text, legal_description text,
        year_built integer, building_area double precision,
        tax_year integer, tax_version text, roll_correction_id text,
        taxing_units text, exemptions text, market_area text,
        county text NOT NULL DEFAULT 'Montgomery',
        boundary geometry(MultiPolygon, 4326) NOT NULL,
        created_at timestamptz NOT NULL DEFAULT now(),
        updated_at timestamptz NOT NULL DEFAULT now()
    )
"#;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("PARCELS_TEST_DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url,
        // Temp tables are per connection
        max_connections: 1,
        ..DatabaseConfig::default()
    };
    let pool = connect(&config).await.expect("connect to test database");

    sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
        .execute(&pool)
        .await
        .expect("postgis extension");
    sqlx::query(SCHEMA).execute(&pool).await.expect("create parcels");

    Some(pool)
}

fn rect(id: i64, lon: f64, lat: f64, width: f64, height: f64) -> Parcel {
    let ring = vec![
        Position::new(lon, lat),
        Position::new(lon + width, lat),
        Position::new(lon + width, lat + height),
        Position::new(lon, lat + height),
        Position::new(lon, lat),
    ];
    Parcel::new(id, 70_000 + id, &format!("R{id}"), Polygon::new(ring, vec![]).into())
}

async fn insert(pool: &PgPool, parcel: &Parcel) {
    let geojson = encode_multi_polygon(&parcel.boundary)
        .expect("encode")
        .expect("non-empty boundary");

    sqlx::query(
        "INSERT INTO parcels (id, object_id, pin, owner_name, boundary)
         VALUES ($1, $2, $3, $4, ST_SetSRID(ST_GeomFromGeoJSON($5), 4326))",
    )
    .bind(parcel.id)
    .bind(parcel.object_id)
    .bind(&parcel.pin)
    .bind(&parcel.owner_name)
    .bind(geojson)
    .execute(pool)
    .await
    .expect("insert parcel");
}

fn service(pool: PgPool) -> ParcelService {
    let store = Arc::new(PgParcelStore::new(pool));
    ParcelService::new(Arc::new(StoreParcelRepository::new(store)))
}

#[tokio::test]
async fn test_point_queries_against_postgis() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let mut known = rect(1, -95.4510, 30.3470, 0.0020, 0.0015);
    known.owner_name = Some("SMITH JOHN".to_string());
    insert(&pool, &known).await;

    let service = service(pool);
    let ctx = QueryContext::new();

    let parcel = service
        .get_at_point(&ctx, Coordinate::new(30.3477, -95.4502))
        .await
        .expect("parcel at known point");
    assert_eq!(parcel.id, 1);
    assert_eq!(parcel.owner_name.as_deref(), Some("SMITH JOHN"));
    assert_eq!(parcel.situs_address, None);
    assert_eq!(parcel.county, "Montgomery");
    assert_eq!(parcel.boundary.len(), 1);
    let ring = parcel.boundary.polygons()[0].exterior().expect("exterior ring");
    assert_eq!(ring.len(), 5);
    assert!((ring[0].longitude - -95.4510).abs() < 1e-9);
    assert!((ring[0].latitude - 30.3470).abs() < 1e-9);

    let err = service
        .get_at_point(&ctx, Coordinate::new(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ParcelNotFound { .. }));
}

#[tokio::test]
async fn test_radius_queries_against_postgis() {
    let Some(pool) = test_pool().await else {
        return;
    };

    // Roughly 100m, 300m and 600m east of the query point
    let origin = Coordinate::new(30.3477, -95.4502);
    let meters_to_lon = |m: f64| m / (111_320.0 * origin.latitude.to_radians().cos());
    for (id, meters) in [(3, 600.0), (1, 100.0), (2, 300.0)] {
        let parcel = rect(id, origin.longitude + meters_to_lon(meters), 30.3470, 0.0005, 0.0015);
        insert(&pool, &parcel).await;
    }

    let service = service(pool);
    let ctx = QueryContext::new();

    let results = service.get_nearby(&ctx, origin, 1000.0).await.unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.parcel.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    for pair in results.windows(2) {
        assert!(pair[0].distance_meters <= pair[1].distance_meters);
    }
    assert!((results[0].distance_meters - 100.0).abs() < 2.0);

    let results = service.get_nearby(&ctx, origin, 200.0).await.unwrap();
    assert_eq!(results.len(), 1);

    let results = service
        .get_nearby(&ctx, Coordinate::new(0.0, 0.0), 5000.0)
        .await
        .unwrap();
    assert!(results.is_empty());
}
