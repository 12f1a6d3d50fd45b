#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pre-computed neighbor relationships for census geographies.
//!
//! The neighbor store answers "which states border this state" from a
//! static seeded table, and "which counties border this county" from a
//! spatial analysis of county polygons that runs once per state and is
//! persisted. It also caches point → geography lookups so repeated POI
//! batches don't re-hit the Census geocoder.
//!
//! Reads are O(neighbor count); the expensive spatial work happens at
//! most once per state per repository lifetime.

mod adjacency;
mod repository;
mod store;

pub use adjacency::{counties_are_adjacent, shared_boundary_length_m};
pub use repository::{
    CountyNeighbor, MemoryRepository, NeighborRepository, NeighborStatistics, NullRepository,
    PointGeography, RepositoryType, SqliteRepository, build_repository,
};
pub use store::NeighborStore;

use thiserror::Error;

/// Errors from neighbor-store operations.
#[derive(Debug, Error)]
pub enum NeighborError {
    /// The SQLite repository failed.
    #[error("neighbor repository error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// County polygons could not be fetched for a build.
    #[error("boundary fetch failed: {0}")]
    Boundary(#[from] socialmapper_boundaries::BoundaryError),

    /// A point lookup failed at the geocoder.
    #[error("geocoding failed: {0}")]
    Geocode(#[from] socialmapper_geocoder::GeocodeError),

    /// Repository file could not be opened.
    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),
}
