//! Store-facing GeoJSON codec.
//!
//! Decodes the text produced by `ST_AsGeoJSON` and encodes text suitable for
//! `ST_GeomFromGeoJSON`. Agrees byte-for-byte with the serde impls on
//! [`Polygon`] and [`MultiPolygon`].

use super::{GeometryError, MultiPolygon, Polygon, RawGeometry, Ring, MULTI_POLYGON, POLYGON};

/// Decode a MultiPolygon column.
///
/// A NULL column (`None`) decodes to the empty geometry rather than an error.
pub fn decode_multi_polygon(bytes: Option<&[u8]>) -> Result<MultiPolygon, GeometryError> {
    let Some(bytes) = bytes else {
        return Ok(MultiPolygon::default());
    };

    let raw: RawGeometry<Vec<Vec<Ring>>> = serde_json::from_slice(bytes)?;
    raw.into_coordinates(MULTI_POLYGON).map(MultiPolygon::from_rings)
}

/// Decode a Polygon column. NULL decodes to the empty polygon.
pub fn decode_polygon(bytes: Option<&[u8]>) -> Result<Polygon, GeometryError> {
    let Some(bytes) = bytes else {
        return Ok(Polygon::default());
    };

    let raw: RawGeometry<Vec<Ring>> = serde_json::from_slice(bytes)?;
    raw.into_coordinates(POLYGON).map(Polygon)
}

/// Encode a MultiPolygon for the store.
///
/// Returns `None` for a geometry with no polygons so the column is written as
/// NULL instead of an empty collection.
pub fn encode_multi_polygon(geometry: &MultiPolygon) -> Result<Option<String>, GeometryError> {
    if geometry.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(geometry)?))
}

/// Encode a Polygon for the store. A polygon with no rings encodes to `None`.
pub fn encode_polygon(polygon: &Polygon) -> Result<Option<String>, GeometryError> {
    if polygon.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(polygon)?))
}
