//! HTTP handlers for parcel lookups.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parcels::store::PgParcelStore;
use parcels::{
    Coordinate, ErrorKind, Parcel, ParcelService, ParcelWithDistance, QueryContext, ServiceError,
};

/// Application state shared across handlers
pub struct AppState {
    pub service: ParcelService,
    /// `None` when serving from an in-memory fixture
    pub database: Option<PgParcelStore>,
    pub query_timeout: Duration,
    pub default_radius_meters: f64,
}

impl AppState {
    fn context(&self) -> QueryContext {
        QueryContext::new().with_timeout(self.query_timeout)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/parcels/at", get(at_point_handler))
        .route("/v1/parcels/nearby", get(nearby_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match &state.database {
        Some(store) => store.health_check().await,
        None => true,
    };

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
}

/// Parcel containing a point
async fn at_point_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointQueryParams>,
) -> Result<Json<Parcel>, ApiError> {
    let point = Coordinate::new(params.lat, params.lng);
    let parcel = state.service.get_at_point(&state.context(), point).await?;
    Ok(Json(parcel))
}

/// Parcels near a point
async fn nearby_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyQueryParams>,
) -> Result<Json<NearbyResponse>, ApiError> {
    let point = Coordinate::new(params.lat, params.lng);
    let radius = params.radius.unwrap_or(state.default_radius_meters);

    let parcels = state
        .service
        .get_nearby(&state.context(), point, radius)
        .await?;

    Ok(Json(NearbyResponse {
        count: parcels.len(),
        radius_meters: radius,
        parcels,
    }))
}

#[derive(Deserialize)]
struct PointQueryParams {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct NearbyQueryParams {
    lat: f64,
    lng: f64,
    /// Meters; the configured default applies when omitted
    radius: Option<f64>,
}

#[derive(Serialize)]
struct NearbyResponse {
    parcels: Vec<ParcelWithDistance>,
    count: usize,
    radius_meters: f64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps service errors to responses without leaking store details
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Failure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self.0.kind() {
            ErrorKind::Validation | ErrorKind::NotFound => self.0.to_string(),
            ErrorKind::Cancelled => "request timed out".to_string(),
            ErrorKind::Failure => "internal server error".to_string(),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
