#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding for points and addresses.
//!
//! Two directions:
//!
//! - **Point → geography**: the Census Bureau geographies endpoint
//!   resolves a (lat, lon) to its state, county, tract, block group,
//!   and ZCTA identifiers. Results are partial by design — any field
//!   may be absent — and are cached per exact coordinate pair.
//! - **Address → point**: the Census Bureau one-line address endpoint
//!   (free, no API key), with **Nominatim / OpenStreetMap** as a
//!   fallback provider (strict 1 request per second etiquette, which
//!   the shared rate-limited client enforces per host).
//!
//! See <https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html>

pub mod census;
pub mod nominatim;
mod service;

pub use service::Geocoder;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Geographic identifiers resolved for a point or address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lon: f64,
    /// Two-digit state FIPS code.
    pub state_fips: Option<String>,
    /// Three-digit county FIPS code.
    pub county_fips: Option<String>,
    /// 11-digit tract GEOID.
    pub tract_geoid: Option<String>,
    /// 12-digit block-group GEOID.
    pub block_group_geoid: Option<String>,
    /// 5-digit ZCTA code.
    pub zcta_geoid: Option<String>,
    /// Match confidence, when the provider reports one.
    pub confidence: Option<f64>,
    /// Which provider produced this result.
    pub source: Option<String>,
}

impl GeocodeResult {
    /// A result carrying only the coordinates, all geography unknown.
    #[must_use]
    pub fn empty(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Self::default()
        }
    }

    /// Returns `true` when no geography field resolved.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.state_fips.is_none()
            && self.county_fips.is_none()
            && self.tract_geoid.is_none()
            && self.block_group_geoid.is_none()
            && self.zcta_geoid.is_none()
    }
}

/// A geocoded address with coordinates and match metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The matched/canonical address returned by the geocoder.
    pub matched_address: Option<String>,
    /// Which provider resolved this address.
    pub provider: GeocodingProvider,
    /// Quality of the match.
    pub match_quality: MatchQuality,
}

/// Which geocoding provider to use for addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodingProvider {
    /// US Census Bureau geocoder.
    Census,
    /// Nominatim / OpenStreetMap.
    Nominatim,
    /// Census first, Nominatim on miss.
    Auto,
}

/// Quality of a geocoding match, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    /// Exact address match.
    Exact,
    /// Interpolated along a street segment.
    Interpolated,
    /// Centroid of a containing feature.
    Centroid,
    /// Approximate / fuzzy match.
    Approximate,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed after retries.
    #[error("geocoder HTTP error: {0}")]
    Http(#[from] socialmapper_http::HttpError),

    /// Response shape did not match the endpoint contract.
    #[error("geocoder parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_has_no_geography() {
        let result = GeocodeResult::empty(35.78, -78.64);
        assert!(result.is_empty());
        assert!((result.lat - 35.78).abs() < f64::EPSILON);
    }

    #[test]
    fn match_quality_orders_best_first() {
        assert!(MatchQuality::Exact < MatchQuality::Interpolated);
        assert!(MatchQuality::Centroid < MatchQuality::Approximate);
    }
}
