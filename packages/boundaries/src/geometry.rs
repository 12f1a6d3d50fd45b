//! `GeoJSON` → `geo` geometry parsing and validity repair.

use geo::{BooleanOps, MultiPolygon, Validation};

/// Parses the `geometry` member of a `GeoJSON` feature into a
/// [`MultiPolygon`]. Handles both `Polygon` and `MultiPolygon` types;
/// anything else returns `None`.
#[must_use]
pub fn parse_feature_geometry(geometry: &serde_json::Value) -> Option<MultiPolygon<f64>> {
    let geojson_geom: geojson::Geometry = serde_json::from_value(geometry.clone()).ok()?;
    let geo_geom: geo::Geometry<f64> = geojson_geom.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    }
}

/// Returns a valid version of `geometry`, repairing when possible.
///
/// Valid input passes through unchanged. Invalid input gets one repair
/// attempt — a union against the empty set, which re-noded rings and
/// fixes orientation/self-touch defects. Returns `None` when the
/// geometry stays invalid or collapses to nothing, in which case the
/// caller drops the unit and records it.
#[must_use]
pub fn repair_geometry(geometry: MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if geometry.is_valid() {
        return Some(geometry);
    }

    let repaired = geometry.union(&MultiPolygon::<f64>::new(Vec::new()));
    if repaired.0.is_empty() || !repaired.is_valid() {
        return None;
    }
    log::debug!("repaired invalid geometry ({} rings)", repaired.0.len());
    Some(repaired)
}
