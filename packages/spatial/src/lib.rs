#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial intersection of census units with isochrone coverage.
//!
//! Builds the unary union of all isochrone polygons, indexes the
//! candidate units in an R-tree, and keeps exactly the units whose
//! geometry intersects the union. Bounding-box hits from the tree are
//! confirmed with an exact intersection test, so the result has no
//! false positives beyond repaired geometries (which are logged).

use geo::{BoundingRect, Intersects, MultiPolygon, Polygon, unary_union};
use rstar::{AABB, RTree, RTreeObject};
use socialmapper_boundaries::{GeographicUnit, repair_geometry};
use socialmapper_isochrone::Isochrone;

/// A unit the intersection filter had to drop.
#[derive(Debug, Clone)]
pub struct DroppedUnit {
    /// The unit's GEOID.
    pub geoid: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Result of an intersection filter pass.
#[derive(Debug, Default)]
pub struct IntersectionResult {
    /// Units intersecting the isochrone union, input order preserved.
    pub units: Vec<GeographicUnit>,
    /// Units dropped for unrepairable geometry.
    pub dropped: Vec<DroppedUnit>,
}

/// Candidate unit stored in the R-tree with its index and envelope.
struct UnitEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for UnitEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Filters `units` to those intersecting the union of `isochrones`.
///
/// Invalid unit geometries get one repair attempt before the test;
/// units that stay invalid are dropped and reported.
#[must_use]
pub fn filter_intersecting_units(
    units: Vec<GeographicUnit>,
    isochrones: &[Isochrone],
) -> IntersectionResult {
    let coverage = isochrone_union(isochrones);
    if coverage.0.is_empty() {
        log::warn!("isochrone union is empty; no units can intersect");
        return IntersectionResult::default();
    }
    let Some(coverage_bbox) = coverage.bounding_rect() else {
        return IntersectionResult::default();
    };
    let coverage_envelope = AABB::from_corners(
        [coverage_bbox.min().x, coverage_bbox.min().y],
        [coverage_bbox.max().x, coverage_bbox.max().y],
    );

    let mut entries = Vec::with_capacity(units.len());
    let mut dropped = Vec::new();
    let mut repaired_units: Vec<Option<GeographicUnit>> = Vec::with_capacity(units.len());

    for (index, unit) in units.into_iter().enumerate() {
        let geoid = unit.geoid.clone();
        match repair_geometry(unit.geometry.clone()) {
            Some(geometry) => {
                let mut unit = unit;
                unit.geometry = geometry;
                if let Some(bbox) = unit.geometry.bounding_rect() {
                    entries.push(UnitEntry {
                        index,
                        envelope: AABB::from_corners(
                            [bbox.min().x, bbox.min().y],
                            [bbox.max().x, bbox.max().y],
                        ),
                    });
                }
                repaired_units.push(Some(unit));
            }
            None => {
                log::warn!("dropping unit {geoid}: unrepairable geometry");
                dropped.push(DroppedUnit {
                    geoid,
                    reason: "unrepairable geometry".to_string(),
                });
                repaired_units.push(None);
            }
        }
    }

    let tree = RTree::bulk_load(entries);
    let mut selected: Vec<usize> = tree
        .locate_in_envelope_intersecting(&coverage_envelope)
        .filter(|entry| {
            repaired_units[entry.index]
                .as_ref()
                .is_some_and(|unit| unit.geometry.intersects(&coverage))
        })
        .map(|entry| entry.index)
        .collect();
    selected.sort_unstable();

    let mut units = Vec::with_capacity(selected.len());
    for index in selected {
        if let Some(unit) = repaired_units[index].take() {
            units.push(unit);
        }
    }

    log::info!(
        "{} units intersect the isochrone coverage ({} dropped)",
        units.len(),
        dropped.len()
    );
    IntersectionResult { units, dropped }
}

/// Unary union of all isochrone polygons, skipping degenerate ones.
#[must_use]
pub fn isochrone_union(isochrones: &[Isochrone]) -> MultiPolygon<f64> {
    let polygons: Vec<&Polygon<f64>> = isochrones
        .iter()
        .filter(|iso| !iso.is_degenerate())
        .map(|iso| &iso.polygon)
        .collect();

    match polygons.len() {
        0 => MultiPolygon::new(Vec::new()),
        1 => MultiPolygon::new(vec![polygons[0].clone()]),
        _ => unary_union(polygons),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use socialmapper_geography_models::GeographicLevel;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    fn unit(geoid: &str, polygon: Polygon<f64>) -> GeographicUnit {
        GeographicUnit {
            level: GeographicLevel::BlockGroup,
            geoid: geoid.to_string(),
            name: None,
            state_fips: None,
            county_fips: None,
            tract_code: None,
            block_group_code: None,
            geometry: MultiPolygon::new(vec![polygon]),
        }
    }

    fn isochrone(polygon: Polygon<f64>) -> Isochrone {
        Isochrone {
            poi_id: "p1".to_string(),
            poi_name: "POI".to_string(),
            travel_time_minutes: 15,
            polygon,
            avg_travel_speed_kmh: 50.0,
            avg_travel_speed_mph: 31.0,
        }
    }

    #[test]
    fn keeps_exactly_the_intersecting_units() {
        let units = vec![
            unit("inside", square(0.2, 0.2, 0.2)),
            unit("overlapping", square(0.9, 0.9, 0.5)),
            unit("outside", square(5.0, 5.0, 1.0)),
        ];
        let isochrones = vec![isochrone(square(0.0, 0.0, 1.0))];

        let result = filter_intersecting_units(units, &isochrones);
        let geoids: Vec<&str> = result.units.iter().map(|u| u.geoid.as_str()).collect();
        assert_eq!(geoids, vec!["inside", "overlapping"]);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn union_spans_multiple_isochrones() {
        let units = vec![
            unit("near_first", square(0.5, 0.5, 0.2)),
            unit("near_second", square(10.5, 10.5, 0.2)),
            unit("nowhere", square(20.0, 20.0, 0.2)),
        ];
        let isochrones = vec![
            isochrone(square(0.0, 0.0, 1.0)),
            isochrone(square(10.0, 10.0, 1.0)),
        ];

        let result = filter_intersecting_units(units, &isochrones);
        assert_eq!(result.units.len(), 2);
    }

    #[test]
    fn degenerate_isochrones_contribute_nothing() {
        let empty = Polygon::new(geo::LineString::new(Vec::new()), Vec::new());
        let union = isochrone_union(&[isochrone(empty)]);
        assert!(union.0.is_empty());

        let result =
            filter_intersecting_units(vec![unit("any", square(0.0, 0.0, 1.0))], &[]);
        assert!(result.units.is_empty());
    }

    #[test]
    fn boundary_touch_counts_as_intersecting() {
        let units = vec![unit("touching", square(1.0, 0.0, 1.0))];
        let isochrones = vec![isochrone(square(0.0, 0.0, 1.0))];
        let result = filter_intersecting_units(units, &isochrones);
        assert_eq!(result.units.len(), 1);
    }
}
