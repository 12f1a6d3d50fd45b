//! Spatial clustering of POIs to share road-network downloads.
//!
//! DBSCAN over the locally projected plane (degrees scaled to
//! kilometers around the batch's mean latitude), with an R-tree
//! answering the epsilon-neighborhood queries. Noise points become
//! singleton clusters so every POI still gets an isochrone.

use geo::{Distance, Haversine, Point};
use rstar::{RTree, primitives::GeomWithData};
use socialmapper_poi_models::Poi;

/// Kilometers per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

/// A group of POIs close enough to share one network download.
#[derive(Debug, Clone)]
pub struct PoiCluster {
    /// Cluster identifier, unique within a run.
    pub id: usize,
    /// Indices into the input POI slice.
    pub poi_indices: Vec<usize>,
    /// Centroid as (lat, lon).
    pub centroid: (f64, f64),
    /// Maximum haversine distance from the centroid to a member, km.
    pub radius_km: f64,
    /// Whether this cluster came from a DBSCAN core or is a singleton.
    pub is_noise: bool,
}

impl PoiCluster {
    /// Number of POIs in the cluster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.poi_indices.len()
    }

    /// Returns `true` for an empty cluster (never produced by
    /// [`cluster_pois`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poi_indices.is_empty()
    }

    /// Bounding box of the member POIs expanded by `buffer_km`, as
    /// `(min_lat, min_lon, max_lat, max_lon)`.
    #[must_use]
    pub fn bounding_box(&self, pois: &[Poi], buffer_km: f64) -> (f64, f64, f64, f64) {
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        for &index in &self.poi_indices {
            let poi = &pois[index];
            min_lat = min_lat.min(poi.lat);
            max_lat = max_lat.max(poi.lat);
            min_lon = min_lon.min(poi.lon);
            max_lon = max_lon.max(poi.lon);
        }
        let buffer_deg = buffer_km / KM_PER_DEGREE;
        (
            min_lat - buffer_deg,
            min_lon - buffer_deg,
            max_lat + buffer_deg,
            max_lon + buffer_deg,
        )
    }
}

/// Clusters POIs by proximity with DBSCAN.
///
/// `eps_km` bounds the neighbor distance on the projected plane and
/// `min_samples` is the DBSCAN core threshold. Inputs smaller than
/// `min_samples`, and all noise points, come back as singletons.
#[must_use]
pub fn cluster_pois(pois: &[Poi], eps_km: f64, min_samples: usize) -> Vec<PoiCluster> {
    if pois.is_empty() {
        return Vec::new();
    }
    if pois.len() < min_samples {
        return singleton_clusters(pois, 0);
    }

    // Project to an approximate km plane around the mean latitude.
    #[allow(clippy::cast_precision_loss)]
    let mean_lat = pois.iter().map(|p| p.lat).sum::<f64>() / pois.len() as f64;
    let lon_scale = KM_PER_DEGREE * mean_lat.to_radians().cos();
    let projected: Vec<[f64; 2]> = pois
        .iter()
        .map(|p| [p.lat * KM_PER_DEGREE, p.lon * lon_scale])
        .collect();

    let tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        projected
            .iter()
            .enumerate()
            .map(|(i, xy)| GeomWithData::new(*xy, i))
            .collect(),
    );
    let eps_sq = eps_km * eps_km;
    let neighbors_of = |i: usize| -> Vec<usize> {
        tree.locate_within_distance(projected[i], eps_sq)
            .map(|hit| hit.data)
            .collect()
    };

    // Classic DBSCAN labeling: None = unvisited, Some(None) = noise,
    // Some(Some(id)) = cluster member.
    let mut labels: Vec<Option<Option<usize>>> = vec![None; pois.len()];
    let mut next_cluster = 0usize;

    for i in 0..pois.len() {
        if labels[i].is_some() {
            continue;
        }
        let seed_neighbors = neighbors_of(i);
        if seed_neighbors.len() < min_samples {
            labels[i] = Some(None);
            continue;
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        labels[i] = Some(Some(cluster_id));

        let mut queue: Vec<usize> = seed_neighbors;
        while let Some(j) = queue.pop() {
            match labels[j] {
                Some(Some(_)) => continue,
                Some(None) | None => {
                    let was_unvisited = labels[j].is_none();
                    labels[j] = Some(Some(cluster_id));
                    if was_unvisited {
                        let expansion = neighbors_of(j);
                        if expansion.len() >= min_samples {
                            queue.extend(expansion);
                        }
                    }
                }
            }
        }
    }

    // Assemble clusters; noise points become singletons after the
    // numbered clusters.
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); next_cluster];
    let mut noise: Vec<usize> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        match label {
            Some(Some(id)) => members[*id].push(i),
            _ => noise.push(i),
        }
    }

    let mut clusters: Vec<PoiCluster> = members
        .into_iter()
        .enumerate()
        .map(|(id, indices)| build_cluster(id, indices, pois, false))
        .collect();
    let offset = clusters.len();
    for (k, index) in noise.into_iter().enumerate() {
        clusters.push(build_cluster(offset + k, vec![index], pois, true));
    }
    clusters
}

/// Estimated download savings from clustering a POI batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringSavings {
    /// POIs in the batch.
    pub total_pois: usize,
    /// Clusters formed (= network downloads needed).
    pub total_clusters: usize,
    /// Downloads without clustering (one per POI).
    pub downloads_without_clustering: usize,
    /// Downloads avoided.
    pub download_reduction: usize,
    /// Reduction as a percentage of the unclustered count.
    pub reduction_percentage: f64,
}

/// Computes the download-savings summary for a clustering result.
#[must_use]
pub fn estimate_savings(total_pois: usize, clusters: &[PoiCluster]) -> ClusteringSavings {
    let reduction = total_pois.saturating_sub(clusters.len());
    #[allow(clippy::cast_precision_loss)]
    let percentage = if total_pois == 0 {
        0.0
    } else {
        reduction as f64 / total_pois as f64 * 100.0
    };
    ClusteringSavings {
        total_pois,
        total_clusters: clusters.len(),
        downloads_without_clustering: total_pois,
        download_reduction: reduction,
        reduction_percentage: percentage,
    }
}

fn singleton_clusters(pois: &[Poi], id_offset: usize) -> Vec<PoiCluster> {
    pois.iter()
        .enumerate()
        .map(|(i, _)| build_cluster(id_offset + i, vec![i], pois, true))
        .collect()
}

fn build_cluster(id: usize, indices: Vec<usize>, pois: &[Poi], is_noise: bool) -> PoiCluster {
    #[allow(clippy::cast_precision_loss)]
    let n = indices.len() as f64;
    let lat = indices.iter().map(|&i| pois[i].lat).sum::<f64>() / n;
    let lon = indices.iter().map(|&i| pois[i].lon).sum::<f64>() / n;
    let center = Point::new(lon, lat);
    let radius_km = indices
        .iter()
        .map(|&i| Haversine.distance(center, Point::new(pois[i].lon, pois[i].lat)) / 1000.0)
        .fold(0.0, f64::max);

    PoiCluster {
        id,
        poi_indices: indices,
        centroid: (lat, lon),
        radius_km,
        is_noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn poi(id: &str, lat: f64, lon: f64) -> Poi {
        Poi {
            id: id.to_string(),
            name: None,
            lat,
            lon,
            poi_type: None,
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn dense_pois_form_one_cluster() {
        // 100 POIs inside a ~2 km square: one download instead of 100.
        let mut pois = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                pois.push(poi(
                    &format!("p{i}_{j}"),
                    35.78 + f64::from(i) * 0.002,
                    -78.64 + f64::from(j) * 0.002,
                ));
            }
        }
        let clusters = cluster_pois(&pois, 10.0, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 100);

        let savings = estimate_savings(pois.len(), &clusters);
        assert_eq!(savings.download_reduction, 99);
        assert!(savings.reduction_percentage >= 90.0);
    }

    #[test]
    fn far_apart_pois_are_noise_singletons() {
        let pois = vec![
            poi("raleigh", 35.78, -78.64),
            poi("charlotte", 35.23, -80.84),
            poi("asheville", 35.60, -82.55),
        ];
        let clusters = cluster_pois(&pois, 10.0, 2);
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| c.len() == 1 && c.is_noise));
    }

    #[test]
    fn cluster_diameter_is_bounded() {
        let pois = vec![
            poi("a", 35.780, -78.640),
            poi("b", 35.790, -78.650),
            poi("c", 35.800, -78.660),
            poi("far", 36.500, -79.500),
        ];
        let eps = 10.0;
        let clusters = cluster_pois(&pois, eps, 2);
        for cluster in &clusters {
            if !cluster.is_noise {
                // Every member sits within eps of some core point, so
                // the centroid radius is bounded by the chain length.
                assert!(cluster.radius_km <= 2.0 * eps, "radius {}", cluster.radius_km);
            }
        }
        assert!(clusters.iter().any(|c| c.is_noise && c.len() == 1));
    }

    #[test]
    fn fewer_pois_than_min_samples_become_singletons() {
        let pois = vec![poi("only", 35.78, -78.64)];
        let clusters = cluster_pois(&pois, 10.0, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 1);
        assert!((clusters[0].centroid.0 - 35.78).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_includes_buffer() {
        let pois = vec![poi("a", 35.0, -78.0), poi("b", 35.1, -78.1)];
        let clusters = cluster_pois(&pois, 50.0, 2);
        let (min_lat, min_lon, max_lat, max_lon) = clusters[0].bounding_box(&pois, 5.0);
        assert!(min_lat < 35.0);
        assert!(min_lon < -78.1);
        assert!(max_lat > 35.1);
        assert!(max_lon > -78.0);
    }

    #[test]
    fn empty_input_clusters_to_nothing() {
        assert!(cluster_pois(&[], 10.0, 2).is_empty());
    }
}
