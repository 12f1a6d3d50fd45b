#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census boundary retrieval from the `TIGERweb` REST services.
//!
//! Downloads block-group, county, and ZCTA polygons as `GeoJSON` from
//! the `TIGERweb` `MapServer` layers, standardizes the attribute names,
//! and parses geometries into `geo` multipolygons. Responses are cached
//! per (level, state, year) for 24 hours.
//!
//! ZCTAs have no state attribute on the national layer; they are
//! filtered by GEOID prefix, which keeps every ZCTA strictly inside the
//! state and may over-include border ZCTAs. Treat the result as a
//! superset.

mod geometry;
mod tiger;

pub use geometry::{parse_feature_geometry, repair_geometry};
pub use tiger::BoundaryService;

use geo::MultiPolygon;
use socialmapper_geography_models::GeographicLevel;
use thiserror::Error;

/// Errors from boundary retrieval.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// HTTP request failed after retries.
    #[error("TIGERweb HTTP error: {0}")]
    Http(#[from] socialmapper_http::HttpError),

    /// Response shape did not match the ArcGIS REST contract.
    #[error("TIGERweb response error: {message}")]
    Response {
        /// Description of what was malformed.
        message: String,
    },
}

/// A census geographic unit with its boundary polygon (WGS84).
#[derive(Debug, Clone)]
pub struct GeographicUnit {
    /// Which geography level this unit belongs to.
    pub level: GeographicLevel,
    /// Canonical zero-padded GEOID.
    pub geoid: String,
    /// Human-readable name, when the layer provides one.
    pub name: Option<String>,
    /// Two-digit state FIPS code.
    pub state_fips: Option<String>,
    /// Three-digit county FIPS code.
    pub county_fips: Option<String>,
    /// Six-digit tract code.
    pub tract_code: Option<String>,
    /// One-digit block-group code.
    pub block_group_code: Option<String>,
    /// Boundary geometry in EPSG:4326.
    pub geometry: MultiPolygon<f64>,
}

impl GeographicUnit {
    /// Checks that the GEOID components agree with the GEOID string.
    #[must_use]
    pub fn components_agree(&self) -> bool {
        let prefix_ok = |part: Option<&String>, range: std::ops::Range<usize>| {
            part.is_none_or(|p| self.geoid.get(range).is_some_and(|slice| slice == p))
        };
        match self.level {
            GeographicLevel::Zcta => true,
            _ => {
                prefix_ok(self.state_fips.as_ref(), 0..2)
                    && prefix_ok(self.county_fips.as_ref(), 2..5)
                    && prefix_ok(self.tract_code.as_ref(), 5..11)
                    && prefix_ok(self.block_group_code.as_ref(), 11..12)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit(geoid: &str, state: &str, county: &str) -> GeographicUnit {
        GeographicUnit {
            level: GeographicLevel::BlockGroup,
            geoid: geoid.to_string(),
            name: None,
            state_fips: Some(state.to_string()),
            county_fips: Some(county.to_string()),
            tract_code: None,
            block_group_code: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)
            ]]),
        }
    }

    #[test]
    fn component_agreement() {
        assert!(unit("371830524042", "37", "183").components_agree());
        assert!(!unit("371830524042", "38", "183").components_agree());
        assert!(!unit("371830524042", "37", "001").components_agree());
    }
}
