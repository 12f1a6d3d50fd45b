//! US Census Bureau Geocoder client.
//!
//! Two endpoints of the Bureau's free geocoding service (no API key):
//!
//! - Geographies: `GET /geocoder/geographies/coordinates` — resolves a
//!   point to its containing census geographies.
//! - Locations: `GET /geocoder/locations/onelineaddress` — resolves a
//!   free-form address to coordinates.
//!
//! See <https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html>

use socialmapper_http::RateLimitedClient;

use crate::{GeocodeError, GeocodeResult, GeocodedAddress, GeocodingProvider, MatchQuality};

/// Base URL for the Census geocoding service.
pub const GEOCODER_BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder";

/// Benchmark identifier pinned for reproducible lookups.
pub const BENCHMARK: &str = "Public_AR_Current";

/// Vintage identifier pinned for reproducible lookups.
pub const VINTAGE: &str = "Current_Current";

/// Resolves a point to its containing census geographies.
///
/// Any block missing from the response leaves the corresponding field
/// `None`; callers treat partial results as usable.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the request fails after retries.
/// Malformed payloads produce an empty result, not an error.
pub async fn geocode_point(
    client: &RateLimitedClient,
    lat: f64,
    lon: f64,
) -> Result<GeocodeResult, GeocodeError> {
    let url = format!("{GEOCODER_BASE_URL}/geographies/coordinates");
    let query = [
        ("x", lon.to_string()),
        ("y", lat.to_string()),
        ("benchmark", BENCHMARK.to_string()),
        ("vintage", VINTAGE.to_string()),
        ("format", "json".to_string()),
    ];

    let body = client.get_json(&url, &query).await?;
    Ok(parse_geographies_response(&body, lat, lon))
}

/// Geocodes a free-form one-line address via the Census locations
/// endpoint.
///
/// Returns `Ok(None)` when the Bureau has no match for the address.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the request fails or the response is
/// missing the match array.
pub async fn geocode_address(
    client: &RateLimitedClient,
    address: &str,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let url = format!("{GEOCODER_BASE_URL}/locations/onelineaddress");
    let query = [
        ("address", address.to_string()),
        ("benchmark", BENCHMARK.to_string()),
        ("format", "json".to_string()),
    ];

    let body = client.get_json(&url, &query).await?;
    parse_address_response(&body)
}

/// Parses the geographies response into a partial [`GeocodeResult`].
fn parse_geographies_response(body: &serde_json::Value, lat: f64, lon: f64) -> GeocodeResult {
    let geographies = &body["result"]["geographies"];
    if geographies.is_null() {
        log::warn!("census geocoder returned no geographies block for ({lat}, {lon})");
        return GeocodeResult::empty(lat, lon);
    }

    let mut result = GeocodeResult::empty(lat, lon);
    result.source = Some("census".to_string());

    if let Some(county) = geographies["Counties"].as_array().and_then(|a| a.first()) {
        result.state_fips = county["STATE"].as_str().map(String::from);
        result.county_fips = county["COUNTY"].as_str().map(String::from);
    }

    if let Some(tract) = geographies["Census Tracts"]
        .as_array()
        .and_then(|a| a.first())
    {
        result.tract_geoid = tract["GEOID"].as_str().map(String::from);
    }

    if let Some(block_group) = geographies["Census Block Groups"]
        .as_array()
        .and_then(|a| a.first())
    {
        result.block_group_geoid = block_group["GEOID"].as_str().map(String::from);
    }

    if let Some(zcta) = geographies["2020 Census ZIP Code Tabulation Areas"]
        .as_array()
        .and_then(|a| a.first())
    {
        result.zcta_geoid = zcta["GEOID"]
            .as_str()
            .or_else(|| zcta["ZCTA5"].as_str())
            .map(String::from);
    }

    result
}

/// Parses the locations response into an optional match.
fn parse_address_response(
    body: &serde_json::Value,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let matches = body["result"]["addressMatches"]
        .as_array()
        .ok_or_else(|| GeocodeError::Parse {
            message: "missing addressMatches array".to_string(),
        })?;

    let Some(first) = matches.first() else {
        return Ok(None);
    };

    let x = first["coordinates"]["x"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "missing x coordinate".to_string(),
        })?;
    let y = first["coordinates"]["y"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "missing y coordinate".to_string(),
        })?;

    Ok(Some(GeocodedAddress {
        latitude: y,
        longitude: x,
        matched_address: first["matchedAddress"].as_str().map(String::from),
        provider: GeocodingProvider::Census,
        match_quality: MatchQuality::Exact,
    }))
}
