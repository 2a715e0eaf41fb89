//! Parcel query service.
//!
//! Validates caller input before any I/O, calls the repository once, and
//! decides what an empty answer means for each operation: nothing at a point
//! is [`ServiceError::ParcelNotFound`], nothing nearby is an empty list.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::models::{Coordinate, CoordinateError, Parcel, ParcelWithDistance};
use crate::repository::{ParcelRepository, RepositoryError};
use crate::store::QueryContext;

/// Accepted radius range in meters (inclusive). Keep the `InvalidRadius`
/// message in sync.
pub const RADIUS_RANGE_METERS: (f64, f64) = (1.0, 5000.0);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),

    #[error("invalid radius: {radius_meters}m is outside [1, 5000] meters")]
    InvalidRadius { radius_meters: f64 },

    #[error("no parcel found at {point}")]
    ParcelNotFound { point: Coordinate },

    #[error("query cancelled: {0}")]
    Cancelled(#[source] RepositoryError),

    #[error("parcel lookup failed: {0}")]
    Downstream(#[source] RepositoryError),
}

/// Coarse classification for transport layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied out-of-range input
    Validation,
    /// Point query matched nothing
    NotFound,
    /// Caller cancelled or the deadline passed
    Cancelled,
    /// Store or data-integrity failure
    Failure,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidCoordinates(_) | ServiceError::InvalidRadius { .. } => {
                ErrorKind::Validation
            }
            ServiceError::ParcelNotFound { .. } => ErrorKind::NotFound,
            ServiceError::Cancelled(_) => ErrorKind::Cancelled,
            ServiceError::Downstream(_) => ErrorKind::Failure,
        }
    }

    fn from_repository(err: RepositoryError) -> Self {
        if err.is_cancellation() {
            ServiceError::Cancelled(err)
        } else {
            ServiceError::Downstream(err)
        }
    }
}

/// Validate a radius against [`RADIUS_RANGE_METERS`]. NaN never passes.
pub fn validate_radius(radius_meters: f64) -> Result<(), ServiceError> {
    let (min, max) = RADIUS_RANGE_METERS;
    if (min..=max).contains(&radius_meters) {
        Ok(())
    } else {
        Err(ServiceError::InvalidRadius { radius_meters })
    }
}

/// Entry point for point and radius parcel lookups
#[derive(Clone)]
pub struct ParcelService {
    repository: Arc<dyn ParcelRepository>,
}

impl ParcelService {
    pub fn new(repository: Arc<dyn ParcelRepository>) -> Self {
        Self { repository }
    }

    /// The parcel containing `point`.
    pub async fn get_at_point(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
    ) -> Result<Parcel, ServiceError> {
        if let Err(err) = point.validate() {
            warn!(
                lat = point.latitude,
                lng = point.longitude,
                error = %err,
                "rejected point query"
            );
            return Err(err.into());
        }

        let found = self
            .repository
            .find_containing(ctx, point)
            .await
            .map_err(|err| {
                error!(
                    lat = point.latitude,
                    lng = point.longitude,
                    error = %err,
                    "point query failed"
                );
                ServiceError::from_repository(err)
            })?;

        match found {
            Some(parcel) => {
                info!(
                    lat = point.latitude,
                    lng = point.longitude,
                    parcel_id = parcel.id,
                    "parcel found at point"
                );
                Ok(parcel)
            }
            None => {
                info!(
                    lat = point.latitude,
                    lng = point.longitude,
                    "no parcel at point"
                );
                Err(ServiceError::ParcelNotFound { point })
            }
        }
    }

    /// Parcels within `radius_meters` of `point`, nearest first.
    ///
    /// An empty result is returned as-is.
    pub async fn get_nearby(
        &self,
        ctx: &QueryContext,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<ParcelWithDistance>, ServiceError> {
        if let Err(err) = point
            .validate()
            .map_err(ServiceError::from)
            .and_then(|_| validate_radius(radius_meters))
        {
            warn!(
                lat = point.latitude,
                lng = point.longitude,
                radius_m = radius_meters,
                error = %err,
                "rejected nearby query"
            );
            return Err(err);
        }

        let parcels = self
            .repository
            .find_within(ctx, point, radius_meters)
            .await
            .map_err(|err| {
                error!(
                    lat = point.latitude,
                    lng = point.longitude,
                    radius_m = radius_meters,
                    error = %err,
                    "nearby query failed"
                );
                ServiceError::from_repository(err)
            })?;

        info!(
            lat = point.latitude,
            lng = point.longitude,
            radius_m = radius_meters,
            count = parcels.len(),
            "nearby query complete"
        );

        Ok(parcels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeometryError, Polygon, Position};
    use crate::repository::StoreParcelRepository;
    use crate::store::{InMemoryParcelStore, ParcelRow, ParcelStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and answers nothing
    #[derive(Default)]
    struct RecordingRepository {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ParcelRepository for RecordingRepository {
        async fn find_containing(
            &self,
            _: &QueryContext,
            _: Coordinate,
        ) -> Result<Option<Parcel>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_within(
            &self,
            _: &QueryContext,
            _: Coordinate,
            _: f64,
        ) -> Result<Vec<ParcelWithDistance>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn recording() -> (ParcelService, Arc<RecordingRepository>) {
        let repo = Arc::new(RecordingRepository::default());
        (ParcelService::new(repo.clone()), repo)
    }

    fn rect_parcel(id: i64, lon: f64, lat: f64, width: f64, height: f64) -> Parcel {
        let ring = vec![
            Position::new(lon, lat),
            Position::new(lon + width, lat),
            Position::new(lon + width, lat + height),
            Position::new(lon, lat + height),
            Position::new(lon, lat),
        ];
        Parcel::new(id, 9000 + id, &format!("R{id:06}"), Polygon::new(ring, vec![]).into())
    }

    fn store_service(parcels: &[Parcel]) -> (ParcelService, Arc<InMemoryParcelStore>) {
        let store = Arc::new(InMemoryParcelStore::build(parcels).unwrap());
        let repo = StoreParcelRepository::new(Arc::clone(&store));
        (ParcelService::new(Arc::new(repo)), store)
    }

    /// Known parcel around (30.3477, -95.4502)
    fn conroe_parcel() -> Parcel {
        rect_parcel(41, -95.4510, 30.3470, 0.0020, 0.0015)
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_never_reach_repository() {
        let (service, repo) = recording();
        let ctx = QueryContext::new();

        let bad = [
            Coordinate::new(91.0, -95.45),
            Coordinate::new(-90.5, 0.0),
            Coordinate::new(0.0, 180.1),
            Coordinate::new(0.0, -181.0),
            Coordinate::new(f64::NAN, 0.0),
        ];
        for point in bad {
            let err = service.get_at_point(&ctx, point).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);

            let err = service.get_nearby(&ctx, point, 100.0).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_latitude_error_mentions_bounds() {
        let (service, _) = recording();
        let err = service
            .get_at_point(&QueryContext::new(), Coordinate::new(91.0, -95.45))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidCoordinates(_)));
        let message = err.to_string();
        assert!(message.contains("latitude"), "{message}");
        assert!(message.contains("[-90, 90]"), "{message}");
    }

    #[tokio::test]
    async fn test_out_of_range_radius_never_reaches_repository() {
        let (service, repo) = recording();
        let ctx = QueryContext::new();
        let point = Coordinate::new(30.3477, -95.4502);

        for radius in [0.0, 0.999, 5000.001, 5001.0, -10.0, f64::NAN] {
            let err = service.get_nearby(&ctx, point, radius).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidRadius { .. }));
        }

        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);

        // Bounds are inclusive
        service.get_nearby(&ctx, point, 1.0).await.unwrap();
        service.get_nearby(&ctx, point, 5000.0).await.unwrap();
        assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_radius_error_mentions_bounds() {
        let (service, _) = recording();
        let err = service
            .get_nearby(&QueryContext::new(), Coordinate::new(30.3477, -95.4502), 5001.0)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("radius"), "{message}");
        assert!(message.contains("[1, 5000]"), "{message}");
    }

    #[tokio::test]
    async fn test_point_inside_known_parcel() {
        let (service, _) = store_service(&[
            conroe_parcel(),
            rect_parcel(42, -95.46, 30.36, 0.001, 0.001),
        ]);

        let parcel = service
            .get_at_point(&QueryContext::new(), Coordinate::new(30.3477, -95.4502))
            .await
            .unwrap();
        assert_eq!(parcel.id, 41);
    }

    #[tokio::test]
    async fn test_open_ocean_is_not_found() {
        let (service, store) = store_service(&[conroe_parcel()]);

        let err = service
            .get_at_point(&QueryContext::new(), Coordinate::new(0.0, 0.0))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::ParcelNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_nothing_nearby_is_empty_not_error() {
        let (service, _) = store_service(&[conroe_parcel()]);

        let parcels = service
            .get_nearby(&QueryContext::new(), Coordinate::new(0.0, 0.0), 5000.0)
            .await
            .unwrap();
        assert!(parcels.is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_policy_differs_by_operation() {
        let (service, repo) = recording();
        let ctx = QueryContext::new();
        let point = Coordinate::new(30.0, -95.0);

        let at_point = service.get_at_point(&ctx, point).await;
        let nearby = service.get_nearby(&ctx, point, 1000.0).await;

        assert!(matches!(at_point, Err(ServiceError::ParcelNotFound { .. })));
        assert!(matches!(nearby, Ok(ref v) if v.is_empty()));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_three_parcels_ordered_by_distance() {
        // East of the query point at roughly 100m, 300m and 600m
        let origin = Coordinate::new(30.3477, -95.4502);
        let meters_to_lon = |m: f64| m / (111_320.0 * origin.latitude.to_radians().cos());
        let parcels = [
            rect_parcel(3, origin.longitude + meters_to_lon(600.0), 30.3470, 0.0005, 0.0015),
            rect_parcel(1, origin.longitude + meters_to_lon(100.0), 30.3470, 0.0005, 0.0015),
            rect_parcel(2, origin.longitude + meters_to_lon(300.0), 30.3470, 0.0005, 0.0015),
        ];
        let (service, _) = store_service(&parcels);

        let results = service
            .get_nearby(&QueryContext::new(), origin, 1000.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let ids: Vec<i64> = results.iter().map(|r| r.parcel.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        for pair in results.windows(2) {
            assert!(pair[0].distance_meters <= pair[1].distance_meters);
        }
        for r in &results {
            assert!(r.distance_meters >= 0.0 && r.distance_meters <= 1000.0);
        }
        assert!((results[0].distance_meters - 100.0).abs() < 5.0);
    }

    #[tokio::test]
    async fn test_radius_excludes_far_parcels() {
        let origin = Coordinate::new(30.3477, -95.4502);
        let (service, _) = store_service(&[
            conroe_parcel(),
            rect_parcel(50, -95.40, 30.3470, 0.001, 0.001),
        ]);

        let results = service
            .get_nearby(&QueryContext::new(), origin, 250.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].parcel.id, 41);
        assert_eq!(results[0].distance_meters, 0.0);
    }

    #[tokio::test]
    async fn test_store_failure_is_downstream() {
        let (service, store) = store_service(&[conroe_parcel()]);
        store.fail_next("too many connections");

        let err = service
            .get_at_point(&QueryContext::new(), Coordinate::new(30.3477, -95.4502))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(matches!(
            err,
            ServiceError::Downstream(RepositoryError::Store {
                source: StoreError::Unavailable(_),
                ..
            })
        ));
    }

    /// Answers every query with one row whose boundary is tagged as a Polygon
    struct UnreadableBoundaryStore {
        row: ParcelRow,
    }

    impl UnreadableBoundaryStore {
        fn new() -> Self {
            let mut row = ParcelRow::from_parcel(&conroe_parcel()).unwrap();
            row.boundary_geojson = Some(r#"{"type":"Polygon","coordinates":[]}"#.into());
            row.distance_meters = Some(0.0);
            Self { row }
        }
    }

    #[async_trait]
    impl ParcelStore for UnreadableBoundaryStore {
        async fn query_containing(&self, _: Coordinate) -> Result<Option<ParcelRow>, StoreError> {
            Ok(Some(self.row.clone()))
        }

        async fn query_within(
            &self,
            _: Coordinate,
            _: f64,
            _: i64,
        ) -> Result<Vec<ParcelRow>, StoreError> {
            Ok(vec![self.row.clone()])
        }
    }

    #[tokio::test]
    async fn test_unreadable_boundary_is_downstream_failure() {
        let repo = StoreParcelRepository::new(Arc::new(UnreadableBoundaryStore::new()));
        let service = ParcelService::new(Arc::new(repo));
        let ctx = QueryContext::new();
        let point = Coordinate::new(30.3477, -95.4502);

        let err = service.get_at_point(&ctx, point).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(matches!(
            err,
            ServiceError::Downstream(RepositoryError::Geometry {
                parcel_id: 41,
                source: GeometryError::UnexpectedType { .. },
            })
        ));

        let err = service.get_nearby(&ctx, point, 500.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(matches!(
            err,
            ServiceError::Downstream(RepositoryError::Geometry { parcel_id: 41, .. })
        ));
    }

    #[tokio::test]
    async fn test_deadline_is_distinct_from_failure() {
        let store = InMemoryParcelStore::build(&[conroe_parcel()])
            .unwrap()
            .with_latency(Duration::from_secs(30));
        let repo = StoreParcelRepository::new(Arc::new(store));
        let service = ParcelService::new(Arc::new(repo));
        let ctx = QueryContext::new().with_timeout(Duration::from_millis(20));

        let err = service
            .get_nearby(&ctx, Coordinate::new(30.3477, -95.4502), 100.0)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
