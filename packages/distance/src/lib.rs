#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearest-POI distance enrichment.
//!
//! Unit polygons and POIs are projected to EPSG:5070 (CONUS Albers
//! equal-area, meters) where centroids and pairwise distances are
//! Euclidean. Centroids are reprojected to WGS84 for the output
//! record. Batches above the chunk threshold are partitioned across
//! worker threads; order is restored on concatenation.

use geo::{Centroid, MapCoords};
use proj4rs::Proj;
use rayon::prelude::*;
use socialmapper_boundaries::GeographicUnit;
use socialmapper_isochrone::{AVG_TRAVEL_SPEED_KMH, AVG_TRAVEL_SPEED_MPH};
use socialmapper_poi_models::Poi;
use thiserror::Error;

/// Kilometers → miles.
const MILES_PER_KM: f64 = 0.621_371;

/// Default centroid count above which work is chunked across threads.
pub const DEFAULT_CHUNK_SIZE: usize = 5_000;

/// EPSG:5070, NAD83 / CONUS Albers equal-area.
const EPSG_5070: &str = "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 \
     +x_0=0 +y_0=0 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs";

/// Plain WGS84 longitude/latitude.
const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Errors from distance computation.
#[derive(Debug, Error)]
pub enum DistanceError {
    /// Projection setup or transform failed.
    #[error("projection error: {message}")]
    Projection {
        /// What failed.
        message: String,
    },
}

/// A unit enriched with its nearest-POI distance.
#[derive(Debug, Clone)]
pub struct UnitDistance {
    /// The unit's GEOID.
    pub geoid: String,
    /// Unit centroid latitude (WGS84).
    pub centroid_lat: f64,
    /// Unit centroid longitude (WGS84).
    pub centroid_lon: f64,
    /// Identifier of the nearest POI, when any POI exists.
    pub poi_id: Option<String>,
    /// Name of the nearest POI.
    pub poi_name: Option<String>,
    /// Travel-time budget the run was made with.
    pub travel_time_minutes: u32,
    /// Assumed average speed, km/h.
    pub avg_travel_speed_kmh: f64,
    /// Assumed average speed, mph.
    pub avg_travel_speed_mph: f64,
    /// Distance to the nearest POI in kilometers.
    pub travel_distance_km: Option<f64>,
    /// Distance to the nearest POI in miles.
    pub travel_distance_miles: Option<f64>,
}

/// Computes nearest-POI distances for unit centroids.
pub struct DistanceEngine {
    chunk_size: usize,
}

impl Default for DistanceEngine {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DistanceEngine {
    /// Builds an engine with a custom chunk threshold.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Enriches each unit with its nearest-POI distance and POI
    /// metadata. With an empty POI list every distance is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DistanceError`] when the projections cannot be
    /// constructed or a POI cannot be projected.
    pub fn add_travel_distances(
        &self,
        units: &[GeographicUnit],
        pois: &[Poi],
        travel_time_minutes: u32,
    ) -> Result<Vec<UnitDistance>, DistanceError> {
        let wgs84 = projection(WGS84)?;
        let conus = projection(EPSG_5070)?;

        // POIs project once, up front.
        let projected_pois: Vec<(f64, f64)> = pois
            .iter()
            .map(|poi| project_point(&wgs84, &conus, poi.lon, poi.lat))
            .collect::<Result<_, _>>()?;

        let per_unit = |unit: &GeographicUnit| -> UnitDistance {
            unit_distance(
                unit,
                pois,
                &projected_pois,
                &wgs84,
                &conus,
                travel_time_minutes,
            )
        };

        let results: Vec<UnitDistance> = if units.len() > self.chunk_size {
            log::info!(
                "computing distances for {} centroids in chunks of {}",
                units.len(),
                self.chunk_size
            );
            units
                .par_chunks(self.chunk_size)
                .flat_map_iter(|chunk| chunk.iter().map(&per_unit))
                .collect()
        } else {
            units.iter().map(per_unit).collect()
        };

        Ok(results)
    }

}

/// Distance record for one unit.
fn unit_distance(
    unit: &GeographicUnit,
    pois: &[Poi],
    projected_pois: &[(f64, f64)],
    wgs84: &Proj,
    conus: &Proj,
    travel_time_minutes: u32,
) -> UnitDistance {
    let (centroid_lat, centroid_lon, nearest) =
        centroid_and_nearest(unit, projected_pois, wgs84, conus);

    let (poi_id, poi_name, distance_km) = match nearest {
        Some((index, meters)) => (
            Some(pois[index].id.clone()),
            Some(pois[index].display_name()),
            Some(meters / 1000.0),
        ),
        None => (None, None, None),
    };

    UnitDistance {
        geoid: unit.geoid.clone(),
        centroid_lat,
        centroid_lon,
        poi_id,
        poi_name,
        travel_time_minutes,
        avg_travel_speed_kmh: AVG_TRAVEL_SPEED_KMH,
        avg_travel_speed_mph: AVG_TRAVEL_SPEED_MPH,
        travel_distance_km: distance_km,
        travel_distance_miles: distance_km.map(|km| km * MILES_PER_KM),
    }
}

/// Projected centroid (reported in WGS84) and the nearest projected
/// POI as `(index, meters)`.
fn centroid_and_nearest(
    unit: &GeographicUnit,
    projected_pois: &[(f64, f64)],
    wgs84: &Proj,
    conus: &Proj,
) -> (f64, f64, Option<(usize, f64)>) {
    // Project the polygon, take the centroid in equal-area space.
    let projected_geometry = unit.geometry.try_map_coords(|coord| {
        project_point(wgs84, conus, coord.x, coord.y)
            .map(|(x, y)| geo::Coord { x, y })
    });

    let projected_centroid = projected_geometry
        .ok()
        .and_then(|geometry| geometry.centroid());

    let Some(centroid) = projected_centroid else {
        // Fall back to the unprojected centroid for the record; no
        // distance is computable.
        let fallback = unit.geometry.centroid();
        let (lon, lat) = fallback.map_or((f64::NAN, f64::NAN), |c| (c.x(), c.y()));
        log::warn!("unit {}: centroid not projectable", unit.geoid);
        return (lat, lon, None);
    };

    let nearest = projected_pois
        .iter()
        .enumerate()
        .map(|(index, (x, y))| {
            let dx = centroid.x() - x;
            let dy = centroid.y() - y;
            (index, dx.hypot(dy))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1));

    // Reproject the centroid back to WGS84 for the output record.
    let (centroid_lat, centroid_lon) =
        match unproject_point(conus, wgs84, centroid.x(), centroid.y()) {
            Ok((lon, lat)) => (lat, lon),
            Err(e) => {
                log::warn!("unit {}: centroid reprojection failed: {e}", unit.geoid);
                (f64::NAN, f64::NAN)
            }
        };

    (centroid_lat, centroid_lon, nearest)
}

fn projection(definition: &str) -> Result<Proj, DistanceError> {
    Proj::from_proj_string(definition).map_err(|e| DistanceError::Projection {
        message: e.to_string(),
    })
}

/// Projects a WGS84 lon/lat (degrees) into the target CRS (meters).
fn project_point(
    wgs84: &Proj,
    target: &Proj,
    lon: f64,
    lat: f64,
) -> Result<(f64, f64), DistanceError> {
    let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
    proj4rs::transform::transform(wgs84, target, &mut point).map_err(|e| {
        DistanceError::Projection {
            message: format!("({lon}, {lat}): {e}"),
        }
    })?;
    Ok((point.0, point.1))
}

/// Inverse of [`project_point`]: meters back to lon/lat degrees.
fn unproject_point(
    source: &Proj,
    wgs84: &Proj,
    x: f64,
    y: f64,
) -> Result<(f64, f64), DistanceError> {
    let mut point = (x, y, 0.0);
    proj4rs::transform::transform(source, wgs84, &mut point).map_err(|e| {
        DistanceError::Projection {
            message: format!("({x}, {y}): {e}"),
        }
    })?;
    Ok((point.0.to_degrees(), point.1.to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Distance, Haversine, MultiPolygon, Point, polygon};
    use socialmapper_geography_models::GeographicLevel;
    use std::collections::BTreeMap;

    fn unit(geoid: &str, x0: f64, y0: f64) -> GeographicUnit {
        GeographicUnit {
            level: GeographicLevel::BlockGroup,
            geoid: geoid.to_string(),
            name: None,
            state_fips: None,
            county_fips: None,
            tract_code: None,
            block_group_code: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: x0, y: y0),
                (x: x0 + 0.01, y: y0),
                (x: x0 + 0.01, y: y0 + 0.01),
                (x: x0, y: y0 + 0.01),
                (x: x0, y: y0),
            ]]),
        }
    }

    fn poi(id: &str, lat: f64, lon: f64) -> Poi {
        Poi {
            id: id.to_string(),
            name: Some(id.to_string()),
            lat,
            lon,
            poi_type: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn nearest_poi_wins() {
        let engine = DistanceEngine::default();
        let units = vec![unit("bg1", -78.64, 35.78)];
        let pois = vec![
            poi("near", 35.785, -78.635),
            poi("far", 36.5, -79.5),
        ];
        let rows = engine.add_travel_distances(&units, &pois, 15).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].poi_id.as_deref(), Some("near"));
        assert!(rows[0].travel_distance_km.unwrap() < 2.0);
        assert!((rows[0].avg_travel_speed_kmh - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn distance_is_at_least_great_circle() {
        let engine = DistanceEngine::default();
        let units = vec![unit("bg1", -78.64, 35.78)];
        let pois = vec![poi("p", 36.0, -79.0)];
        let rows = engine.add_travel_distances(&units, &pois, 15).unwrap();

        let row = &rows[0];
        let centroid = Point::new(row.centroid_lon, row.centroid_lat);
        let haversine_km =
            Haversine.distance(centroid, Point::new(-79.0, 36.0)) / 1000.0;
        let projected_km = row.travel_distance_km.unwrap();
        // Albers is equal-area, not equidistant; allow 2% slack below
        // the great-circle distance.
        assert!(
            projected_km >= haversine_km * 0.98,
            "projected {projected_km} vs haversine {haversine_km}"
        );
    }

    #[test]
    fn miles_follow_kilometers() {
        let engine = DistanceEngine::default();
        let units = vec![unit("bg1", -78.64, 35.78)];
        let pois = vec![poi("p", 35.9, -78.8)];
        let rows = engine.add_travel_distances(&units, &pois, 10).unwrap();
        let km = rows[0].travel_distance_km.unwrap();
        let miles = rows[0].travel_distance_miles.unwrap();
        assert!((miles - km * 0.621_371).abs() < 1e-9);
    }

    #[test]
    fn empty_poi_list_yields_nulls() {
        let engine = DistanceEngine::default();
        let units = vec![unit("bg1", -78.64, 35.78)];
        let rows = engine.add_travel_distances(&units, &[], 15).unwrap();
        assert!(rows[0].travel_distance_km.is_none());
        assert!(rows[0].poi_id.is_none());
        assert!(rows[0].centroid_lat.is_finite());
    }

    #[test]
    fn chunked_processing_preserves_order() {
        let engine = DistanceEngine::new(2);
        let units: Vec<GeographicUnit> = (0..7)
            .map(|i| unit(&format!("bg{i}"), -78.64 + f64::from(i) * 0.02, 35.78))
            .collect();
        let pois = vec![poi("p", 35.78, -78.64)];
        let rows = engine.add_travel_distances(&units, &pois, 15).unwrap();
        let geoids: Vec<&str> = rows.iter().map(|r| r.geoid.as_str()).collect();
        assert_eq!(geoids, vec!["bg0", "bg1", "bg2", "bg3", "bg4", "bg5", "bg6"]);
    }
}
