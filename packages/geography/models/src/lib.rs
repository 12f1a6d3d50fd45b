#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! US state identifier tables and census GEOID types.
//!
//! Provides the FIPS ↔ abbreviation ↔ name mappings for the 50 states +
//! DC, the static state adjacency table used to seed the neighbor
//! store, free-form state normalization, and GEOID component helpers
//! shared across the workspace.

pub mod fips;
pub mod geoid;
pub mod neighbors;
pub mod state;

pub use geoid::GeographicLevel;
pub use state::{StateFormat, normalize_state, normalize_state_list};
