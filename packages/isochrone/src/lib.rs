#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Travel-time isochrone generation.
//!
//! For each POI, the engine produces the polygon of places reachable
//! within a travel-time budget along the road network. Road networks
//! are expensive to download, so POIs are first clustered by proximity
//! (DBSCAN) and each cluster shares one Overpass download. Per POI,
//! the engine snaps to the nearest graph node, runs Dijkstra with a
//! time cutoff, and takes the convex hull of the reached nodes.

pub mod clustering;
pub mod engine;
pub mod network;

pub use clustering::{ClusteringSavings, PoiCluster, cluster_pois, estimate_savings};
pub use engine::{IsochroneEngine, IsochroneRun};
pub use network::{RoadNetwork, TravelMode};

use geo::Polygon;
use serde_json::Value;
use thiserror::Error;

/// Average travel speed reported with every isochrone, in km/h. This
/// is the engine's fallback edge speed, not a measurement.
pub const AVG_TRAVEL_SPEED_KMH: f64 = 50.0;

/// [`AVG_TRAVEL_SPEED_KMH`] in miles per hour.
pub const AVG_TRAVEL_SPEED_MPH: f64 = 31.0;

/// Errors from isochrone generation.
#[derive(Debug, Error)]
pub enum IsochroneError {
    /// Network download failed after retries.
    #[error("road network download failed: {0}")]
    Http(#[from] socialmapper_http::HttpError),

    /// No POIs were supplied.
    #[error("no POIs to generate isochrones for")]
    NoPois,
}

/// Options controlling clustering and network downloads.
#[derive(Debug, Clone)]
pub struct IsochroneOptions {
    /// Travel mode (selects the network type and assumed speeds).
    pub travel_mode: TravelMode,
    /// DBSCAN epsilon in kilometers.
    pub max_cluster_radius_km: f64,
    /// DBSCAN minimum cluster size.
    pub min_cluster_size: usize,
    /// Extra network download margin around a cluster, in kilometers.
    pub network_buffer_km: f64,
    /// Douglas-Peucker tolerance for the output polygon, in degrees.
    pub simplify_tolerance: Option<f64>,
}

impl Default for IsochroneOptions {
    fn default() -> Self {
        Self {
            travel_mode: TravelMode::Drive,
            max_cluster_radius_km: 10.0,
            min_cluster_size: 2,
            network_buffer_km: 5.0,
            simplify_tolerance: None,
        }
    }
}

/// A travel-time polygon for one POI.
#[derive(Debug, Clone)]
pub struct Isochrone {
    /// POI identifier.
    pub poi_id: String,
    /// POI display name.
    pub poi_name: String,
    /// The travel-time budget this polygon represents.
    pub travel_time_minutes: u32,
    /// Reachable-area polygon in WGS84. Empty for degenerate results.
    pub polygon: Polygon<f64>,
    /// Assumed average speed, km/h.
    pub avg_travel_speed_kmh: f64,
    /// Assumed average speed, mph.
    pub avg_travel_speed_mph: f64,
}

impl Isochrone {
    /// Returns `true` when the polygon has no area (degenerate POI).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.polygon.exterior().0.len() < 4
    }
}

/// Lifecycle of one POI cluster through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterState {
    /// Cluster formed, nothing downloaded yet.
    Created,
    /// Road network downloaded and graph built.
    NetworkReady,
    /// Every POI in the cluster has been processed.
    Done,
    /// Terminal failure; the reason is recorded.
    Failed(String),
}

/// A record the engine rejected, with the stage that rejected it.
#[derive(Debug, Clone)]
pub struct IsochroneReject {
    /// The POI or cluster description.
    pub data: Value,
    /// Why it was rejected.
    pub reason: String,
}
