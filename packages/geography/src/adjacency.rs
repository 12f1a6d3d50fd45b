//! Spatial adjacency tests for county polygons.

use geo::{Coord, Distance, Haversine, MultiPolygon, Point, Relate};

/// Rounding scale for vertex matching: 1e-7 degrees ≈ 1 cm.
const VERTEX_SCALE: f64 = 1e7;

/// Returns `true` when two county polygons are adjacent: they touch,
/// or they intersect without their interiors overlapping. The second
/// clause absorbs the slight ring overlaps present in some `TIGERweb`
/// vintages.
#[must_use]
pub fn counties_are_adjacent(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    let matrix = a.relate(b);
    matrix.is_touches() || (matrix.is_intersects() && !matrix.is_overlaps())
}

/// Length in meters of the boundary shared by two adjacent polygons.
///
/// TIGER polygons share exact vertices along common borders, so the
/// shared boundary is the set of segments of `b` whose endpoints both
/// appear in `a`. Segment lengths are measured with the haversine
/// formula.
#[must_use]
pub fn shared_boundary_length_m(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    let vertices: std::collections::HashSet<(i64, i64)> =
        ring_coords(a).map(quantize).collect();

    let mut length = 0.0;
    for polygon in &b.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors().iter()) {
            for segment in ring.0.windows(2) {
                if vertices.contains(&quantize(segment[0])) && vertices.contains(&quantize(segment[1]))
                {
                    length += Haversine.distance(
                        Point::from(segment[0]),
                        Point::from(segment[1]),
                    );
                }
            }
        }
    }
    length
}

/// All ring coordinates of a multipolygon.
fn ring_coords(mp: &MultiPolygon<f64>) -> impl Iterator<Item = Coord<f64>> + '_ {
    mp.0.iter().flat_map(|polygon| {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors().iter())
            .flat_map(|ring| ring.0.iter().copied())
    })
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(coord: Coord<f64>) -> (i64, i64) {
    ((coord.x * VERTEX_SCALE) as i64, (coord.y * VERTEX_SCALE) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn mp(p: geo::Polygon<f64>) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![p])
    }

    #[test]
    fn shared_edge_is_adjacent() {
        let left = mp(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ]);
        let right = mp(polygon![
            (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 0.0)
        ]);
        assert!(counties_are_adjacent(&left, &right));
        assert!(counties_are_adjacent(&right, &left));
    }

    #[test]
    fn disjoint_polygons_are_not_adjacent() {
        let a = mp(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)
        ]);
        let b = mp(polygon![
            (x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0), (x: 5.0, y: 5.0)
        ]);
        assert!(!counties_are_adjacent(&a, &b));
    }

    #[test]
    fn overlapping_interiors_are_not_adjacent() {
        let a = mp(polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)
        ]);
        let b = mp(polygon![
            (x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 1.0)
        ]);
        assert!(!counties_are_adjacent(&a, &b));
    }

    #[test]
    fn corner_touch_is_adjacent_with_zero_shared_length() {
        let a = mp(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ]);
        let b = mp(polygon![
            (x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0), (x: 1.0, y: 1.0)
        ]);
        assert!(counties_are_adjacent(&a, &b));
        assert!(shared_boundary_length_m(&a, &b) < f64::EPSILON);
    }

    #[test]
    fn shared_boundary_length_matches_edge() {
        let left = mp(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)
        ]);
        let right = mp(polygon![
            (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 0.0)
        ]);
        let length = shared_boundary_length_m(&left, &right);
        // One degree of latitude is roughly 111 km.
        assert!((length - 111_000.0).abs() < 1_000.0, "length = {length}");
    }
}
