//! Road-network download and graph construction.
//!
//! Networks come from Overpass as highway ways plus their nodes. Each
//! way contributes edges between consecutive nodes, weighted by travel
//! time (`segment length / edge speed`). Edge speeds come from
//! `maxspeed` tags when parseable, then per-class defaults, then a
//! 50 km/h fallback.

use std::collections::HashMap;
use std::time::Duration;

use geo::{Coord, Distance, Haversine, Point};
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use rstar::{RTree, primitives::GeomWithData};
use serde_json::Value;
use socialmapper_http::{HttpError, RateLimitedClient};

use crate::clustering::PoiCluster;
use socialmapper_poi_models::Poi;

/// The public Overpass interpreter endpoint.
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Server-side timeout for network queries.
const NETWORK_TIMEOUT_SECS: u64 = 180;

/// Fallback edge speed when neither tag nor class resolves, km/h.
pub const FALLBACK_SPEED_KMH: f64 = 50.0;

/// Transport mode; selects the highway classes and speed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TravelMode {
    /// Walking network.
    Walk,
    /// Cycling network.
    Bike,
    /// Driving network.
    #[default]
    Drive,
}

impl TravelMode {
    /// Highway classes downloaded for this mode, as an Overpass regex.
    #[must_use]
    pub const fn highway_filter(self) -> &'static str {
        match self {
            Self::Drive => {
                "motorway|motorway_link|trunk|trunk_link|primary|primary_link|\
                 secondary|secondary_link|tertiary|tertiary_link|unclassified|\
                 residential|living_street|service"
            }
            Self::Walk => {
                "footway|path|pedestrian|steps|track|living_street|residential|\
                 service|unclassified|tertiary|secondary|primary"
            }
            Self::Bike => {
                "cycleway|path|track|living_street|residential|service|\
                 unclassified|tertiary|tertiary_link|secondary|secondary_link|\
                 primary|primary_link"
            }
        }
    }

    /// Speed bound used to size network download radii, km/h.
    #[must_use]
    pub const fn assumed_max_speed_kmh(self) -> f64 {
        match self {
            Self::Walk => 5.0,
            Self::Bike => 16.0,
            Self::Drive => 60.0,
        }
    }

    /// Speed for an edge of the given highway class, km/h.
    #[must_use]
    pub fn edge_speed_kmh(self, highway: &str, maxspeed: Option<&str>) -> f64 {
        match self {
            Self::Walk => 5.0,
            Self::Bike => 16.0,
            Self::Drive => maxspeed
                .and_then(parse_maxspeed_kmh)
                .unwrap_or_else(|| drive_class_speed_kmh(highway)),
        }
    }

    /// Mode label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Bike => "bike",
            Self::Drive => "drive",
        }
    }
}

/// Default drive speeds per highway class, km/h.
fn drive_class_speed_kmh(highway: &str) -> f64 {
    match highway {
        "motorway" => 100.0,
        "trunk" => 80.0,
        "primary" => 65.0,
        "motorway_link" => 60.0,
        "secondary" => 55.0,
        "tertiary" => 50.0,
        "trunk_link" => 50.0,
        "primary_link" | "secondary_link" | "unclassified" | "residential" => 40.0,
        "tertiary_link" => 35.0,
        "service" => 30.0,
        "living_street" => 20.0,
        _ => FALLBACK_SPEED_KMH,
    }
}

/// Parses an OSM `maxspeed` value to km/h. Handles bare numbers
/// ("50"), explicit units ("30 km/h", "35 mph"), and rejects
/// qualitative values ("walk", "none").
#[must_use]
pub fn parse_maxspeed_kmh(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().to_lowercase();
    if let Some(mph) = trimmed.strip_suffix("mph") {
        return mph.trim().parse::<f64>().ok().map(|v| v * 1.609_34);
    }
    let number = trimmed.strip_suffix("km/h").map_or(trimmed.as_str(), str::trim_end);
    number.trim().parse::<f64>().ok().filter(|v| *v > 0.0)
}

/// A routable road network for one cluster.
pub struct RoadNetwork {
    graph: UnGraph<Coord<f64>, f64>,
    index: RTree<GeomWithData<[f64; 2], NodeIndex>>,
}

impl RoadNetwork {
    /// Builds the graph from an Overpass response.
    #[must_use]
    pub fn from_overpass(body: &Value, mode: TravelMode) -> Self {
        let mut graph: UnGraph<Coord<f64>, f64> = UnGraph::new_undirected();
        let mut node_ids: HashMap<i64, NodeIndex> = HashMap::new();

        let elements = body["elements"].as_array().cloned().unwrap_or_default();

        for element in &elements {
            if element["type"].as_str() == Some("node") {
                if let (Some(id), Some(lat), Some(lon)) = (
                    element["id"].as_i64(),
                    element["lat"].as_f64(),
                    element["lon"].as_f64(),
                ) {
                    let index = graph.add_node(Coord { x: lon, y: lat });
                    node_ids.insert(id, index);
                }
            }
        }

        for element in &elements {
            if element["type"].as_str() != Some("way") {
                continue;
            }
            let Some(refs) = element["nodes"].as_array() else {
                continue;
            };
            let highway = element["tags"]["highway"].as_str().unwrap_or_default();
            let maxspeed = element["tags"]["maxspeed"].as_str();
            let speed_kmh = mode.edge_speed_kmh(highway, maxspeed);

            for pair in refs.windows(2) {
                let (Some(a), Some(b)) = (pair[0].as_i64(), pair[1].as_i64()) else {
                    continue;
                };
                let (Some(&from), Some(&to)) = (node_ids.get(&a), node_ids.get(&b)) else {
                    continue;
                };
                let from_coord = graph[from];
                let to_coord = graph[to];
                let length_m =
                    Haversine.distance(Point::from(from_coord), Point::from(to_coord));
                let travel_secs = length_m / (speed_kmh / 3.6);
                graph.add_edge(from, to, travel_secs);
            }
        }

        let index = RTree::bulk_load(
            graph
                .node_indices()
                .map(|i| GeomWithData::new([graph[i].x, graph[i].y], i))
                .collect(),
        );

        Self { graph, index }
    }

    /// Number of graph nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of graph edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nearest graph node to a point, if the graph is non-empty.
    #[must_use]
    pub fn nearest_node(&self, lat: f64, lon: f64) -> Option<NodeIndex> {
        self.index.nearest_neighbor(&[lon, lat]).map(|hit| hit.data)
    }

    /// Coordinates of every node reachable from `start` within
    /// `budget_secs` of travel time.
    #[must_use]
    pub fn reachable_coords(&self, start: NodeIndex, budget_secs: f64) -> Vec<Coord<f64>> {
        let costs = dijkstra(&self.graph, start, None, |edge| *edge.weight());
        costs
            .into_iter()
            .filter(|(_, cost)| *cost <= budget_secs)
            .map(|(node, _)| self.graph[node])
            .collect()
    }
}

/// Downloads the road network for a cluster.
///
/// Single-POI clusters download by radius around the POI; multi-POI
/// clusters download the buffered cluster bounding box. The radius is
/// sized by the travel-time budget at the mode's assumed top speed.
///
/// # Errors
///
/// Returns [`HttpError`] when the Overpass request fails after
/// retries.
pub async fn download_cluster_network(
    http: &RateLimitedClient,
    cluster: &PoiCluster,
    pois: &[Poi],
    mode: TravelMode,
    travel_time_minutes: u32,
    buffer_km: f64,
) -> Result<RoadNetwork, HttpError> {
    let query = if cluster.poi_indices.len() == 1 {
        let poi = &pois[cluster.poi_indices[0]];
        let radius_km =
            f64::from(travel_time_minutes) / 60.0 * mode.assumed_max_speed_kmh() + buffer_km;
        build_radius_query(mode, poi.lat, poi.lon, radius_km * 1000.0)
    } else {
        let (min_lat, min_lon, max_lat, max_lon) = cluster.bounding_box(pois, buffer_km);
        build_bbox_query(mode, min_lat, min_lon, max_lat, max_lon)
    };

    log::debug!("downloading {} network for cluster {}", mode.label(), cluster.id);
    let body = http
        .post_form_json(
            OVERPASS_URL,
            format!("data={}", urlencoding::encode(&query)),
            Duration::from_secs(NETWORK_TIMEOUT_SECS + 30),
        )
        .await?;

    Ok(RoadNetwork::from_overpass(&body, mode))
}

/// Overpass query for highways within a radius of a point.
#[must_use]
pub fn build_radius_query(mode: TravelMode, lat: f64, lon: f64, radius_m: f64) -> String {
    format!(
        "[out:json][timeout:{NETWORK_TIMEOUT_SECS}];\n\
         way[\"highway\"~\"^({})$\"](around:{radius_m:.0},{lat},{lon});\n\
         (._;>;);\nout body;\n",
        mode.highway_filter()
    )
}

/// Overpass query for highways inside a bounding box.
#[must_use]
pub fn build_bbox_query(
    mode: TravelMode,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
) -> String {
    format!(
        "[out:json][timeout:{NETWORK_TIMEOUT_SECS}];\n\
         way[\"highway\"~\"^({})$\"]({min_lat},{min_lon},{max_lat},{max_lon});\n\
         (._;>;);\nout body;\n",
        mode.highway_filter()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A 3-node line: A --(~1.1km)-- B --(~1.1km)-- C.
    fn line_network() -> Value {
        json!({
            "elements": [
                {"type": "node", "id": 1, "lat": 35.780, "lon": -78.640},
                {"type": "node", "id": 2, "lat": 35.790, "lon": -78.640},
                {"type": "node", "id": 3, "lat": 35.800, "lon": -78.640},
                {
                    "type": "way", "id": 10, "nodes": [1, 2, 3],
                    "tags": {"highway": "residential"}
                }
            ]
        })
    }

    #[test]
    fn maxspeed_parsing() {
        assert_eq!(parse_maxspeed_kmh("50"), Some(50.0));
        assert_eq!(parse_maxspeed_kmh("30 km/h"), Some(30.0));
        let mph = parse_maxspeed_kmh("35 mph").unwrap();
        assert!((mph - 56.326_9).abs() < 0.01);
        assert_eq!(parse_maxspeed_kmh("walk"), None);
        assert_eq!(parse_maxspeed_kmh("none"), None);
    }

    #[test]
    fn drive_speed_prefers_maxspeed_tag() {
        let mode = TravelMode::Drive;
        assert!((mode.edge_speed_kmh("residential", Some("30")) - 30.0).abs() < f64::EPSILON);
        assert!((mode.edge_speed_kmh("motorway", None) - 100.0).abs() < f64::EPSILON);
        assert!((mode.edge_speed_kmh("bridleway", None) - FALLBACK_SPEED_KMH).abs() < f64::EPSILON);
    }

    #[test]
    fn walk_speed_is_constant() {
        let mode = TravelMode::Walk;
        assert!((mode.edge_speed_kmh("motorway", Some("100")) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn graph_builds_from_elements() {
        let network = RoadNetwork::from_overpass(&line_network(), TravelMode::Drive);
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.edge_count(), 2);
    }

    #[test]
    fn nearest_node_snaps() {
        let network = RoadNetwork::from_overpass(&line_network(), TravelMode::Drive);
        let node = network.nearest_node(35.781, -78.641).unwrap();
        let coord = network.graph[node];
        assert!((coord.y - 35.780).abs() < 1e-9);
    }

    #[test]
    fn reachability_respects_budget() {
        let network = RoadNetwork::from_overpass(&line_network(), TravelMode::Walk);
        let start = network.nearest_node(35.780, -78.640).unwrap();

        // Each segment is ~1.1 km; walking at 5 km/h that's ~800s.
        let one_hop = network.reachable_coords(start, 900.0);
        assert_eq!(one_hop.len(), 2);

        let all = network.reachable_coords(start, 3600.0);
        assert_eq!(all.len(), 3);

        let none_beyond_start = network.reachable_coords(start, 10.0);
        assert_eq!(none_beyond_start.len(), 1);
    }

    #[test]
    fn queries_name_the_mode_filter() {
        let radius = build_radius_query(TravelMode::Drive, 35.78, -78.64, 15000.0);
        assert!(radius.contains("around:15000"));
        assert!(radius.contains("motorway"));
        let bbox = build_bbox_query(TravelMode::Walk, 35.0, -79.0, 36.0, -78.0);
        assert!(bbox.contains("(35,-79,36,-78)"));
        assert!(bbox.contains("footway"));
    }
}
