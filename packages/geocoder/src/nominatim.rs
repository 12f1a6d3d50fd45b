//! Nominatim / OpenStreetMap geocoder client.
//!
//! Used as a fallback when the Census Bureau geocoder fails to match.
//! Nominatim allows **1 request per second** maximum; the shared
//! rate-limited client enforces that per host, so callers need no
//! extra throttling.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use socialmapper_http::RateLimitedClient;

use crate::{GeocodeError, GeocodedAddress, GeocodingProvider, MatchQuality};

/// Public Nominatim search endpoint.
pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Geocodes a free-form query (address, place, intersection).
///
/// Returns `Ok(None)` when no result matches.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing
/// fails.
pub async fn geocode_freeform(
    client: &RateLimitedClient,
    query: &str,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let params = [
        ("q", query.to_string()),
        ("countrycodes", "us".to_string()),
        ("format", "jsonv2".to_string()),
        ("limit", "1".to_string()),
    ];

    let body = client.get_json(NOMINATIM_SEARCH_URL, &params).await?;
    parse_response(&body)
}

/// Parses a Nominatim JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "missing lon in Nominatim response".to_string(),
        })?;

    Ok(Some(GeocodedAddress {
        latitude: lat,
        longitude: lon,
        matched_address: first["display_name"].as_str().map(String::from),
        provider: GeocodingProvider::Nominatim,
        match_quality: MatchQuality::Approximate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_result() {
        let body = serde_json::json!([{
            "lat": "35.7796",
            "lon": "-78.6382",
            "display_name": "Raleigh, Wake County, North Carolina, USA"
        }]);
        let result = parse_response(&body).unwrap().unwrap();
        assert!((result.latitude - 35.7796).abs() < 1e-4);
        assert!((result.longitude - -78.6382).abs() < 1e-4);
        assert_eq!(result.provider, GeocodingProvider::Nominatim);
    }

    #[test]
    fn parses_nominatim_empty() {
        let body = serde_json::json!([]);
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn non_array_response_is_error() {
        let body = serde_json::json!({"error": "rate limited"});
        assert!(parse_response(&body).is_err());
    }
}
