//! The isochrone engine: cluster, download, generate.

use geo::{ConvexHull, MultiPoint, Point, Polygon, Simplify};
use serde_json::json;
use socialmapper_http::RateLimitedClient;
use socialmapper_poi_models::Poi;

use crate::clustering::{cluster_pois, estimate_savings};
use crate::network::download_cluster_network;
use crate::{
    AVG_TRAVEL_SPEED_KMH, AVG_TRAVEL_SPEED_MPH, ClusterState, Isochrone, IsochroneError,
    IsochroneOptions, IsochroneReject,
};

/// Minimum reachable nodes for a non-degenerate isochrone.
const MIN_REACHABLE_NODES: usize = 2;

/// Result of one engine run.
#[derive(Debug, Default)]
pub struct IsochroneRun {
    /// Isochrones produced, one per non-degenerate POI.
    pub isochrones: Vec<Isochrone>,
    /// POIs and clusters the engine had to reject.
    pub rejected: Vec<IsochroneReject>,
    /// Road networks downloaded (= clusters that reached
    /// `network_ready`).
    pub downloads: usize,
}

/// Generates isochrones for POI batches, sharing network downloads
/// across clustered POIs.
pub struct IsochroneEngine {
    http: RateLimitedClient,
    options: IsochroneOptions,
}

impl IsochroneEngine {
    /// Builds an engine over the shared client.
    #[must_use]
    pub const fn new(http: RateLimitedClient, options: IsochroneOptions) -> Self {
        Self { http, options }
    }

    /// Generates one isochrone per POI for the travel-time budget.
    ///
    /// Clusters whose network download fails are rejected wholesale;
    /// POIs reaching fewer than two nodes yield degenerate (empty)
    /// polygons and a rejection record. Emission order follows cluster
    /// order, not input order.
    ///
    /// # Errors
    ///
    /// Returns [`IsochroneError::NoPois`] for an empty input; network
    /// failures degrade per cluster instead of failing the run.
    pub async fn generate(
        &self,
        pois: &[Poi],
        travel_time_minutes: u32,
    ) -> Result<IsochroneRun, IsochroneError> {
        if pois.is_empty() {
            return Err(IsochroneError::NoPois);
        }

        let clusters = cluster_pois(
            pois,
            self.options.max_cluster_radius_km,
            self.options.min_cluster_size,
        );
        let savings = estimate_savings(pois.len(), &clusters);
        log::info!(
            "clustered {} POIs into {} network downloads ({:.0}% reduction)",
            savings.total_pois,
            savings.total_clusters,
            savings.reduction_percentage
        );

        let mut run = IsochroneRun::default();

        for cluster in &clusters {
            let mut state = ClusterState::Created;
            log::debug!("cluster {}: {state:?} ({} POIs)", cluster.id, cluster.len());

            let network = match download_cluster_network(
                &self.http,
                cluster,
                pois,
                self.options.travel_mode,
                travel_time_minutes,
                self.options.network_buffer_km,
            )
            .await
            {
                Ok(network) if network.node_count() > 0 => {
                    state = ClusterState::NetworkReady;
                    log::debug!(
                        "cluster {}: {state:?} ({} nodes, {} edges)",
                        cluster.id,
                        network.node_count(),
                        network.edge_count()
                    );
                    run.downloads += 1;
                    network
                }
                Ok(_) => {
                    state = ClusterState::Failed("empty road network".to_string());
                    log::warn!("cluster {}: {state:?}", cluster.id);
                    reject_cluster(&mut run, cluster, pois, "empty road network");
                    continue;
                }
                Err(e) => {
                    state = ClusterState::Failed(e.to_string());
                    log::error!("cluster {}: {state:?}", cluster.id);
                    reject_cluster(&mut run, cluster, pois, &format!("network download failed: {e}"));
                    continue;
                }
            };

            for &poi_index in &cluster.poi_indices {
                let poi = &pois[poi_index];
                match self.isochrone_for_poi(poi, &network, travel_time_minutes) {
                    Some(isochrone) => run.isochrones.push(isochrone),
                    None => {
                        run.rejected.push(IsochroneReject {
                            data: json!({
                                "poi_id": poi.id,
                                "poi_name": poi.display_name(),
                                "lat": poi.lat,
                                "lon": poi.lon,
                            }),
                            reason: "degenerate isochrone (fewer than 2 reachable nodes)"
                                .to_string(),
                        });
                    }
                }
            }

            state = ClusterState::Done;
            log::debug!("cluster {}: {state:?}", cluster.id);
        }

        log::info!(
            "generated {} isochrones ({} rejects, {} downloads)",
            run.isochrones.len(),
            run.rejected.len(),
            run.downloads
        );
        Ok(run)
    }

    /// Convex hull of the nodes reachable from the POI's snap point.
    fn isochrone_for_poi(
        &self,
        poi: &Poi,
        network: &crate::network::RoadNetwork,
        travel_time_minutes: u32,
    ) -> Option<Isochrone> {
        let start = network.nearest_node(poi.lat, poi.lon)?;
        let budget_secs = f64::from(travel_time_minutes) * 60.0;
        let reached = network.reachable_coords(start, budget_secs);

        if reached.len() < MIN_REACHABLE_NODES {
            return None;
        }

        let points: Vec<Point<f64>> = reached.into_iter().map(Point::from).collect();
        let mut polygon: Polygon<f64> = MultiPoint::new(points).convex_hull();

        if let Some(tolerance) = self.options.simplify_tolerance {
            polygon = polygon.simplify(&tolerance);
        }

        Some(Isochrone {
            poi_id: poi.id.clone(),
            poi_name: poi.display_name(),
            travel_time_minutes,
            polygon,
            avg_travel_speed_kmh: AVG_TRAVEL_SPEED_KMH,
            avg_travel_speed_mph: AVG_TRAVEL_SPEED_MPH,
        })
    }
}

/// Records every POI of a failed cluster as rejected.
fn reject_cluster(
    run: &mut IsochroneRun,
    cluster: &crate::clustering::PoiCluster,
    pois: &[Poi],
    reason: &str,
) {
    run.rejected.push(IsochroneReject {
        data: json!({
            "cluster_id": cluster.id,
            "poi_count": cluster.len(),
            "centroid": [cluster.centroid.0, cluster.centroid.1],
        }),
        reason: reason.to_string(),
    });
    for &poi_index in &cluster.poi_indices {
        let poi = &pois[poi_index];
        run.rejected.push(IsochroneReject {
            data: json!({"poi_id": poi.id, "poi_name": poi.display_name()}),
            reason: format!("cluster {} failed: {reason}", cluster.id),
        });
    }
}
