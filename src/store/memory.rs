//! In-process parcel store.
//!
//! Answers the same two questions as the PostGIS store from an R-tree held in
//! memory. Used by the unit tests and for running the server without a
//! database. Distances are geodesic on the WGS84 ellipsoid, like PostGIS
//! geography.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use geo::{
    BoundingRect, Closest, ClosestPoint, Contains, Coord, Distance, Geodesic, MapCoords, Point,
};
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use super::{ParcelRow, ParcelStore, StoreError};
use crate::geometry::GeometryError;
use crate::models::{Coordinate, Parcel};

/// Lower bound on the length of one degree of latitude, in meters
const MIN_METERS_PER_DEGREE: f64 = 110_500.0;

/// A stored row with its boundary prepared for spatial predicates
struct IndexedRow {
    row: ParcelRow,
    boundary: geo::MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRow {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedRow {
    fn new(parcel: &Parcel) -> Result<Self, GeometryError> {
        parcel.boundary.validate()?;

        let boundary = parcel.boundary.to_geo();
        let rect = boundary.bounding_rect().ok_or(GeometryError::Empty)?;

        Ok(Self {
            row: ParcelRow::from_parcel(parcel)?,
            boundary,
            envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }

    /// Geodesic distance in meters to the nearest boundary part, zero inside.
    ///
    /// Each part's nearest point is found in a local frame centred on the
    /// query point with longitude scaled by `cos(latitude)`, so "nearest" is
    /// judged in meters rather than degrees.
    fn distance_to(&self, point: Point<f64>) -> f64 {
        if self.boundary.contains(&point) {
            return 0.0;
        }

        let scale = point.y().to_radians().cos().max(f64::EPSILON);
        let to_local = move |c: Coord<f64>| Coord {
            x: (c.x - point.x()) * scale,
            y: c.y - point.y(),
        };
        let origin = Point::new(0.0, 0.0);

        self.boundary
            .iter()
            .map(|part| match part.map_coords(to_local).closest_point(&origin) {
                Closest::Intersection(_) => 0.0,
                Closest::SinglePoint(local) => {
                    let nearest = Point::new(local.x() / scale + point.x(), local.y() + point.y());
                    Geodesic.distance(point, nearest)
                }
                Closest::Indeterminate => f64::INFINITY,
            })
            .fold(f64::INFINITY, f64::min)
    }
}

/// Degree envelope that contains every point within `radius_meters` of
/// `point`. Falls back to the full longitude range near the poles or when
/// the circle crosses the antimeridian.
fn search_envelope(point: Coordinate, radius_meters: f64) -> AABB<[f64; 2]> {
    let delta_lat = radius_meters / MIN_METERS_PER_DEGREE;
    let min_lat = (point.latitude - delta_lat).max(-90.0);
    let max_lat = (point.latitude + delta_lat).min(90.0);

    let widest = min_lat.abs().max(max_lat.abs());
    let delta_lon = radius_meters / (MIN_METERS_PER_DEGREE * widest.to_radians().cos());
    let (min_lon, max_lon) = (point.longitude - delta_lon, point.longitude + delta_lon);

    if min_lon.is_finite() && max_lon.is_finite() && min_lon >= -180.0 && max_lon <= 180.0 {
        AABB::from_corners([min_lon, min_lat], [max_lon, max_lat])
    } else {
        AABB::from_corners([-180.0, min_lat], [180.0, max_lat])
    }
}

/// Parcel store backed by an in-memory R-tree
pub struct InMemoryParcelStore {
    tree: RTree<IndexedRow>,
    calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    latency: Option<Duration>,
}

impl InMemoryParcelStore {
    /// Index the given parcels. Every boundary must pass validation.
    pub fn build(parcels: &[Parcel]) -> Result<Self, GeometryError> {
        let indexed = parcels
            .iter()
            .map(IndexedRow::new)
            .collect::<Result<Vec<_>, _>>()?;

        let tree = RTree::bulk_load(indexed);
        info!("In-memory parcel store built with {} parcels", tree.size());

        Ok(Self {
            tree,
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            latency: None,
        })
    }

    pub fn empty() -> Self {
        Self {
            tree: RTree::new(),
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            latency: None,
        }
    }

    /// Delay every query by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next query fail with [`StoreError::Unavailable`]
    pub fn fail_next(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.to_string());
        }
    }

    /// Number of queries received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self.fail_next.lock().ok().and_then(|mut slot| slot.take());
        match injected {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ParcelStore for InMemoryParcelStore {
    async fn query_containing(&self, point: Coordinate) -> Result<Option<ParcelRow>, StoreError> {
        self.enter().await?;

        let p = Point::new(point.longitude, point.latitude);
        let envelope = AABB::from_point([point.longitude, point.latitude]);

        // Envelope candidates first, then exact containment; lowest id wins
        // so repeated queries are deterministic.
        Ok(self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|ir| ir.boundary.contains(&p))
            .min_by_key(|ir| ir.row.id)
            .map(|ir| ir.row.clone()))
    }

    async fn query_within(
        &self,
        point: Coordinate,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<ParcelRow>, StoreError> {
        self.enter().await?;

        let p = Point::new(point.longitude, point.latitude);

        let mut matches: Vec<(f64, &IndexedRow)> = self
            .tree
            .locate_in_envelope_intersecting(&search_envelope(point, radius_meters))
            .map(|ir| (ir.distance_to(p), ir))
            .filter(|(distance, _)| *distance <= radius_meters)
            .collect();

        matches.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.row.id.cmp(&b.1.row.id)));
        matches.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(matches
            .into_iter()
            .map(|(distance, ir)| ParcelRow {
                distance_meters: Some(distance),
                ..ir.row.clone()
            })
            .collect())
    }
}
