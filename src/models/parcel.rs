//! Parcel records returned by the query layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::MultiPolygon;

/// County used when the store row carries none
pub const DEFAULT_COUNTY: &str = "Montgomery";

/// A tax parcel with its boundary.
///
/// Read-only from this crate's perspective; rows are created by the bulk
/// importer. Optional attributes stay `None` when the source never collected
/// them, which is distinct from an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: i64,

    /// Identifier assigned by the upstream appraisal district export
    pub object_id: i64,

    /// Parcel identification number
    pub pin: String,

    // Subdivision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tract: Option<String>,

    // Owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Owner mailing address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,

    // Property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situs_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdivision_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_description: Option<String>,

    // Improvements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    /// Building area in square feet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_area: Option<f64>,

    // Tax roll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_correction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxing_units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemptions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_area: Option<String>,

    pub county: String,

    /// Never empty for a persisted parcel
    pub boundary: MultiPolygon,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Parcel {
    /// Create a parcel with only the required fields set
    pub fn new(id: i64, object_id: i64, pin: &str, boundary: MultiPolygon) -> Self {
        let now = Utc::now();
        Self {
            id,
            object_id,
            pin: pin.to_string(),
            state_code: None,
            block: None,
            lot: None,
            tract: None,
            owner_name: None,
            owner_address: None,
            situs_address: None,
            subdivision_code: None,
            legal_description: None,
            year_built: None,
            building_area: None,
            tax_year: None,
            tax_version: None,
            roll_correction_id: None,
            taxing_units: None,
            exemptions: None,
            market_area: None,
            county: DEFAULT_COUNTY.to_string(),
            boundary,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A parcel matched by a radius query.
///
/// `distance_meters` is the geodesic distance from the query point to the
/// nearest part of the boundary, zero when the point is inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelWithDistance {
    #[serde(flatten)]
    pub parcel: Parcel,
    pub distance_meters: f64,
}
