#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! POI records and batches.
//!
//! A [`Poi`] is a named point with WGS84 coordinates and free-form
//! tags. Input sources put coordinates in many places — top-level
//! `lat`/`lon`, `latitude`/`longitude`, `lng`, a nested `properties`
//! object, a `coordinates: [lon, lat]` pair, or a GeoJSON point
//! geometry — and [`normalize_coordinates`] funnels all of them to one
//! `(lat, lon)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// Stable identifier (OSM element id or input row id).
    pub id: String,
    /// Display name, when known.
    pub name: Option<String>,
    /// Latitude in WGS84 degrees.
    pub lat: f64,
    /// Longitude in WGS84 degrees.
    pub lon: f64,
    /// POI category (e.g. "amenity:library").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_type: Option<String>,
    /// Free-form tags carried from the source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Poi {
    /// Best display name: the `name` field, the `name` tag, or a
    /// placeholder derived from the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.tags.get("name").cloned())
            .unwrap_or_else(|| format!("poi_{}", self.id))
    }

    /// Returns `true` when the coordinates are finite and in range.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        coordinates_in_range(self.lat, self.lon)
    }
}

/// Metadata carried alongside a batch of POIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// State abbreviations the batch spans, when known.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<String>,
    /// POI count before subsampling, when subsampling happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_count: Option<usize>,
    /// Whether the batch is a random subsample of a larger set.
    #[serde(default)]
    pub sampled: bool,
}

/// A batch of POIs plus its metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiBatch {
    /// The POIs.
    pub pois: Vec<Poi>,
    /// Batch metadata.
    #[serde(default)]
    pub metadata: BatchMetadata,
}

/// Returns `true` when both values are finite and inside WGS84 bounds.
#[must_use]
pub fn coordinates_in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Extracts `(lat, lon)` from a raw record under any recognized alias.
///
/// Checked in order: top-level `lat`/`lon`, `latitude`/`longitude`,
/// `lat`/`lng`, a `coordinates: [lon, lat]` array, a GeoJSON point
/// `geometry`, then the same aliases nested under `properties`. The
/// result is independent of which alias carried the values.
#[must_use]
pub fn normalize_coordinates(record: &Value) -> Option<(f64, f64)> {
    if let Some(pair) = direct_aliases(record) {
        return Some(pair);
    }

    if let Some(coords) = record.get("coordinates").and_then(Value::as_array) {
        if let (Some(lon), Some(lat)) = (
            coords.first().and_then(Value::as_f64),
            coords.get(1).and_then(Value::as_f64),
        ) {
            return Some((lat, lon));
        }
    }

    if let Some(geometry) = record.get("geometry") {
        if geometry.get("type").and_then(Value::as_str) == Some("Point") {
            if let Some(coords) = geometry.get("coordinates").and_then(Value::as_array) {
                if let (Some(lon), Some(lat)) = (
                    coords.first().and_then(Value::as_f64),
                    coords.get(1).and_then(Value::as_f64),
                ) {
                    return Some((lat, lon));
                }
            }
        }
    }

    record.get("properties").and_then(direct_aliases)
}

/// Top-level lat/lon alias pairs on one object.
fn direct_aliases(record: &Value) -> Option<(f64, f64)> {
    let number = |key: &str| -> Option<f64> {
        match record.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };

    let lat = number("lat").or_else(|| number("latitude"))?;
    let lon = number("lon")
        .or_else(|| number("longitude"))
        .or_else(|| number("lng"))?;
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_aliases_normalize_identically() {
        let records = [
            json!({"lat": 35.78, "lon": -78.64}),
            json!({"latitude": 35.78, "longitude": -78.64}),
            json!({"lat": 35.78, "lng": -78.64}),
            json!({"coordinates": [-78.64, 35.78]}),
            json!({"geometry": {"type": "Point", "coordinates": [-78.64, 35.78]}}),
            json!({"properties": {"lat": 35.78, "lon": -78.64}}),
            json!({"properties": {"longitude": -78.64, "latitude": 35.78}}),
        ];
        for record in &records {
            assert_eq!(
                normalize_coordinates(record),
                Some((35.78, -78.64)),
                "failed for {record}"
            );
        }
    }

    #[test]
    fn normalization_is_idempotent_over_alias_mixes() {
        // When several aliases are present, the first recognized wins
        // and agreeing aliases can't change the result.
        let record = json!({
            "lat": 35.78, "lon": -78.64,
            "latitude": 35.78, "longitude": -78.64,
            "coordinates": [-78.64, 35.78]
        });
        assert_eq!(normalize_coordinates(&record), Some((35.78, -78.64)));
    }

    #[test]
    fn string_coordinates_parse() {
        let record = json!({"lat": "35.78", "lon": "-78.64"});
        assert_eq!(normalize_coordinates(&record), Some((35.78, -78.64)));
    }

    #[test]
    fn missing_coordinates_are_none() {
        assert_eq!(normalize_coordinates(&json!({"name": "x"})), None);
        assert_eq!(normalize_coordinates(&json!({"lat": 35.78})), None);
    }

    #[test]
    fn range_validation() {
        assert!(coordinates_in_range(35.78, -78.64));
        assert!(!coordinates_in_range(91.0, 0.0));
        assert!(!coordinates_in_range(0.0, -181.0));
        assert!(!coordinates_in_range(f64::NAN, 0.0));
        assert!(!coordinates_in_range(0.0, f64::INFINITY));
    }

    #[test]
    fn display_name_fallback_chain() {
        let mut poi = Poi {
            id: "123".to_string(),
            name: None,
            lat: 0.0,
            lon: 0.0,
            poi_type: None,
            tags: BTreeMap::new(),
        };
        assert_eq!(poi.display_name(), "poi_123");
        poi.tags.insert("name".to_string(), "Tagged".to_string());
        assert_eq!(poi.display_name(), "Tagged");
        poi.name = Some("Named".to_string());
        assert_eq!(poi.display_name(), "Named");
    }
}
