//! OpenStreetMap POI source via the Overpass API.
//!
//! Builds an Overpass QL query scoped to a named area (with an
//! ISO3166-2 state hint when a state is given), executes it through
//! the rate-limited client with a long timeout, and normalizes the
//! returned elements to POI records. Ways and relations use their
//! `center` (or member-geometry centroid); elements without any
//! coordinates are rejected.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use socialmapper_geography_models::{StateFormat, normalize_state};
use socialmapper_http::RateLimitedClient;
use socialmapper_poi_models::{BatchMetadata, Poi, PoiBatch};

use crate::{PoiError, PoiExtraction, PoiSource, RejectedRecord, validate_poi_name,
    validate_poi_type};

/// The public Overpass interpreter endpoint.
pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Server-side query timeout; the HTTP timeout adds a margin on top.
const OVERPASS_TIMEOUT_SECS: u64 = 180;

/// Specification of an OSM POI search.
#[derive(Debug, Clone)]
pub struct OsmPoiSpec {
    /// Named area to search within (e.g. "Raleigh").
    pub geocode_area: String,
    /// State identifier in any format, used as an area hint.
    pub state: Option<String>,
    /// City name; defaults to the geocode area.
    pub city: Option<String>,
    /// OSM key from the closed POI type set (e.g. "amenity").
    pub poi_type: String,
    /// OSM value (e.g. "library").
    pub poi_name: String,
    /// Extra `key=value` filters ANDed onto the tag match.
    pub additional_tags: BTreeMap<String, String>,
}

impl OsmPoiSpec {
    /// Validates the type/name against the accepted grammar.
    ///
    /// # Errors
    ///
    /// Returns [`PoiError::Invalid`] for out-of-set types or names.
    pub fn validate(&self) -> Result<(), PoiError> {
        validate_poi_type(&self.poi_type)?;
        validate_poi_name(&self.poi_name)?;
        if self.geocode_area.trim().is_empty() {
            return Err(PoiError::Invalid {
                message: "geocode_area must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// POI source backed by Overpass.
pub struct OsmPoiSource {
    http: RateLimitedClient,
    spec: OsmPoiSpec,
}

impl OsmPoiSource {
    /// Builds a source after validating the spec.
    ///
    /// # Errors
    ///
    /// Returns [`PoiError::Invalid`] when the spec fails validation.
    pub fn new(http: RateLimitedClient, spec: OsmPoiSpec) -> Result<Self, PoiError> {
        spec.validate()?;
        Ok(Self { http, spec })
    }
}

#[async_trait]
impl PoiSource for OsmPoiSource {
    async fn produce(&self) -> Result<PoiExtraction, PoiError> {
        let query = build_overpass_query(&self.spec);
        log::debug!("Overpass query:\n{query}");

        let body = self
            .http
            .post_form_json(
                OVERPASS_URL,
                format!("data={}", urlencoding::encode(&query)),
                Duration::from_secs(OVERPASS_TIMEOUT_SECS + 30),
            )
            .await?;

        let (pois, rejected) = convert_elements(&body, &self.spec);
        log::info!(
            "Overpass returned {} POIs for {}={} in {} ({} rejected)",
            pois.len(),
            self.spec.poi_type,
            self.spec.poi_name,
            self.spec.geocode_area,
            rejected.len()
        );

        let states = self
            .spec
            .state
            .as_deref()
            .and_then(|s| normalize_state(s, StateFormat::Abbreviation))
            .into_iter()
            .collect();

        Ok(PoiExtraction {
            batch: PoiBatch {
                pois,
                metadata: BatchMetadata {
                    states,
                    original_count: None,
                    sampled: false,
                },
            },
            rejected,
        })
    }

    fn base_filename(&self) -> String {
        let slug = |s: &str| s.trim().to_lowercase().replace(' ', "_");
        format!(
            "{}_{}_{}",
            slug(&self.spec.geocode_area),
            slug(&self.spec.poi_type),
            slug(&self.spec.poi_name)
        )
    }
}

/// Builds the Overpass QL query for a spec.
///
/// With a state, the named area is resolved inside the state's
/// ISO3166-2 admin area; without one, the name alone scopes the
/// search.
#[must_use]
pub fn build_overpass_query(spec: &OsmPoiSpec) -> String {
    let area_name = spec.city.as_deref().unwrap_or(&spec.geocode_area);
    let mut query = format!("[out:json][timeout:{OVERPASS_TIMEOUT_SECS}];\n");

    let search_area = spec
        .state
        .as_deref()
        .and_then(|s| normalize_state(s, StateFormat::Abbreviation))
        .map_or_else(
            || {
                format!("area[\"name\"=\"{area_name}\"]->.search;\n")
            },
            |abbr| {
                format!(
                    "area[\"ISO3166-2\"=\"US-{abbr}\"][admin_level=4]->.state;\n\
                     area[\"name\"=\"{area_name}\"](area.state)->.search;\n"
                )
            },
        );
    query.push_str(&search_area);

    let mut filters = format!("[\"{}\"=\"{}\"]", spec.poi_type, spec.poi_name);
    for (key, value) in &spec.additional_tags {
        if value.is_empty() {
            filters.push_str(&format!("[\"{key}\"]"));
        } else {
            filters.push_str(&format!("[\"{key}\"=\"{value}\"]"));
        }
    }

    query.push_str("(\n");
    for element in ["node", "way", "relation"] {
        query.push_str(&format!("  {element}{filters}(area.search);\n"));
    }
    query.push_str(");\nout center;\n");
    query
}

/// Normalizes Overpass elements to POIs, rejecting coordinate-less
/// elements.
fn convert_elements(body: &Value, spec: &OsmPoiSpec) -> (Vec<Poi>, Vec<RejectedRecord>) {
    let Some(elements) = body["elements"].as_array() else {
        return (Vec::new(), Vec::new());
    };

    let mut pois = Vec::new();
    let mut rejected = Vec::new();

    for element in elements {
        match element_coordinates(element) {
            Some((lat, lon)) => {
                let tags: BTreeMap<String, String> = element["tags"]
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();

                let id = element["id"]
                    .as_i64()
                    .map_or_else(|| "unknown".to_string(), |id| id.to_string());

                pois.push(Poi {
                    id,
                    name: tags.get("name").cloned(),
                    lat,
                    lon,
                    poi_type: Some(format!("{}:{}", spec.poi_type, spec.poi_name)),
                    tags,
                });
            }
            None => rejected.push(RejectedRecord {
                data: element.clone(),
                reason: "element has no usable coordinates".to_string(),
            }),
        }
    }

    (pois, rejected)
}

/// Coordinates of an element: direct lat/lon for nodes, `center` for
/// ways/relations, member-geometry centroid as a last resort.
fn element_coordinates(element: &Value) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lon)) = (element["lat"].as_f64(), element["lon"].as_f64()) {
        return Some((lat, lon));
    }

    let center = &element["center"];
    if let (Some(lat), Some(lon)) = (center["lat"].as_f64(), center["lon"].as_f64()) {
        return Some((lat, lon));
    }

    let geometry = element["geometry"].as_array()?;
    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;
    let mut count = 0usize;
    for point in geometry {
        if let (Some(lat), Some(lon)) = (point["lat"].as_f64(), point["lon"].as_f64()) {
            lat_sum += lat;
            lon_sum += lon;
            count += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    if count > 0 {
        Some((lat_sum / count as f64, lon_sum / count as f64))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> OsmPoiSpec {
        OsmPoiSpec {
            geocode_area: "Raleigh".to_string(),
            state: Some("North Carolina".to_string()),
            city: None,
            poi_type: "amenity".to_string(),
            poi_name: "library".to_string(),
            additional_tags: BTreeMap::new(),
        }
    }

    #[test]
    fn query_scopes_to_state_area() {
        let query = build_overpass_query(&spec());
        assert!(query.contains("[out:json]"));
        assert!(query.contains("area[\"ISO3166-2\"=\"US-NC\"][admin_level=4]->.state;"));
        assert!(query.contains("area[\"name\"=\"Raleigh\"](area.state)->.search;"));
        assert!(query.contains("node[\"amenity\"=\"library\"](area.search);"));
        assert!(query.contains("way[\"amenity\"=\"library\"](area.search);"));
        assert!(query.contains("relation[\"amenity\"=\"library\"](area.search);"));
        assert!(query.contains("out center;"));
    }

    #[test]
    fn query_without_state_uses_bare_area() {
        let mut spec = spec();
        spec.state = None;
        let query = build_overpass_query(&spec);
        assert!(query.contains("area[\"name\"=\"Raleigh\"]->.search;"));
        assert!(!query.contains("ISO3166-2"));
    }

    #[test]
    fn additional_tags_extend_the_filter() {
        let mut spec = spec();
        spec.additional_tags
            .insert("operator".to_string(), "Wake County".to_string());
        spec.additional_tags.insert("wheelchair".to_string(), String::new());
        let query = build_overpass_query(&spec);
        assert!(query.contains("[\"amenity\"=\"library\"][\"operator\"=\"Wake County\"][\"wheelchair\"]"));
    }

    #[test]
    fn node_and_way_elements_convert() {
        let body = json!({
            "elements": [
                {
                    "type": "node", "id": 1001,
                    "lat": 35.78, "lon": -78.64,
                    "tags": {"name": "Cameron Village Library", "amenity": "library"}
                },
                {
                    "type": "way", "id": 2002,
                    "center": {"lat": 35.79, "lon": -78.66},
                    "tags": {"amenity": "library"}
                },
                {
                    "type": "relation", "id": 3003,
                    "tags": {"amenity": "library"}
                }
            ]
        });
        let (pois, rejected) = convert_elements(&body, &spec());
        assert_eq!(pois.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(pois[0].id, "1001");
        assert_eq!(pois[0].name.as_deref(), Some("Cameron Village Library"));
        assert_eq!(pois[1].id, "2002");
        assert!((pois[1].lat - 35.79).abs() < 1e-9);
        assert_eq!(pois[0].poi_type.as_deref(), Some("amenity:library"));
    }

    #[test]
    fn way_geometry_centroid_fallback() {
        let element = json!({
            "type": "way", "id": 5,
            "geometry": [
                {"lat": 35.0, "lon": -78.0},
                {"lat": 36.0, "lon": -79.0}
            ]
        });
        assert_eq!(element_coordinates(&element), Some((35.5, -78.5)));
    }

    #[test]
    fn invalid_spec_is_rejected_at_construction() {
        let mut bad = spec();
        bad.poi_type = "skyscraper".to_string();
        assert!(bad.validate().is_err());

        let mut bad = spec();
        bad.poi_name = "Library!".to_string();
        assert!(bad.validate().is_err());
    }
}
