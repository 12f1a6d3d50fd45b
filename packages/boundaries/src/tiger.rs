//! Paginated `TIGERweb` `MapServer` fetcher.
//!
//! ArcGIS REST layers cap the features returned per request, so every
//! query walks `resultOffset` pages while `exceededTransferLimit` is
//! set. Each page request already retries through the shared client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use socialmapper_cache::{CacheProvider, cache_key};
use socialmapper_geography_models::GeographicLevel;
use socialmapper_geography_models::geoid::block_group_geoid;
use socialmapper_http::RateLimitedClient;

use crate::{BoundaryError, GeographicUnit, geometry};

/// Base URL for the `TIGERweb` REST services.
pub const TIGERWEB_BASE_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb";

/// Block groups: `Tracts_Blocks` layer 1.
const BLOCK_GROUPS_LAYER: &str = "Tracts_Blocks/MapServer/1";

/// Counties: `State_County` layer 1.
const COUNTIES_LAYER: &str = "State_County/MapServer/1";

/// ZCTAs: national layer 7 of the PUMA/TAD/TAZ/UGA/ZCTA service.
const ZCTA_LAYER: &str = "PUMA_TAD_TAZ_UGA_ZCTA/MapServer/7";

/// Page size for paginated requests. Kept moderate to avoid WAF blocks
/// on large geospatial responses.
const PAGE_SIZE: u32 = 500;

/// `TIGERweb` responses are slow to assemble server-side.
const TIGER_TIMEOUT: Duration = Duration::from_secs(60);

/// Boundary cache lifetime.
const BOUNDARY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fetches census boundaries from `TIGERweb`, caching per
/// (level, state, vintage year).
pub struct BoundaryService {
    http: RateLimitedClient,
    cache: Arc<dyn CacheProvider>,
    year: u16,
}

impl BoundaryService {
    /// Builds a service over the shared client and cache for the given
    /// vintage year.
    #[must_use]
    pub const fn new(http: RateLimitedClient, cache: Arc<dyn CacheProvider>, year: u16) -> Self {
        Self { http, cache, year }
    }

    /// County polygons for one state.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the fetch fails or the response is
    /// not an ArcGIS feature collection.
    pub async fn counties_for_state(
        &self,
        state_fips: &str,
    ) -> Result<Vec<GeographicUnit>, BoundaryError> {
        let features = self
            .fetch_cached(
                GeographicLevel::County,
                state_fips,
                COUNTIES_LAYER,
                &format!("STATE='{state_fips}'"),
            )
            .await?;
        Ok(parse_units(&features, GeographicLevel::County))
    }

    /// Block-group polygons for one state.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the fetch fails or the response is
    /// not an ArcGIS feature collection.
    pub async fn block_groups_for_state(
        &self,
        state_fips: &str,
    ) -> Result<Vec<GeographicUnit>, BoundaryError> {
        let features = self
            .fetch_cached(
                GeographicLevel::BlockGroup,
                state_fips,
                BLOCK_GROUPS_LAYER,
                &format!("STATE='{state_fips}'"),
            )
            .await?;
        Ok(parse_units(&features, GeographicLevel::BlockGroup))
    }

    /// Block-group polygons for a single county.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the fetch fails or the response is
    /// not an ArcGIS feature collection.
    pub async fn block_groups_for_county(
        &self,
        state_fips: &str,
        county_fips: &str,
    ) -> Result<Vec<GeographicUnit>, BoundaryError> {
        let key = cache_key(&json!({
            "op": "tiger",
            "level": "block-group",
            "state": state_fips,
            "county": county_fips,
            "year": self.year,
        }));
        let features = self
            .fetch_features_cached(
                &key,
                BLOCK_GROUPS_LAYER,
                &format!("STATE='{state_fips}' AND COUNTY='{county_fips}'"),
            )
            .await?;
        Ok(parse_units(&features, GeographicLevel::BlockGroup))
    }

    /// ZCTA polygons filtered to one state by GEOID prefix.
    ///
    /// ZCTAs are national and can cross state lines; prefix filtering
    /// keeps every ZCTA strictly within the state and may over-include
    /// border ZCTAs. The result is a documented superset.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the fetch fails or the response is
    /// not an ArcGIS feature collection.
    pub async fn zctas_for_state(
        &self,
        state_fips: &str,
    ) -> Result<Vec<GeographicUnit>, BoundaryError> {
        let key = cache_key(&json!({
            "op": "tiger",
            "level": "zcta",
            "state": state_fips,
            "year": self.year,
        }));

        if let Some(entry) = self.cache.get(&key) {
            if let Some(features) = entry.value.as_array() {
                log::debug!("ZCTA cache hit for state {state_fips}");
                return Ok(parse_units(features, GeographicLevel::Zcta));
            }
        }

        let all = self.fetch_paginated(ZCTA_LAYER, "1=1").await?;
        let filtered: Vec<serde_json::Value> = all
            .into_iter()
            .filter(|feature| {
                zcta_geoid_of(feature).is_some_and(|geoid| geoid.starts_with(state_fips))
            })
            .collect();

        log::info!(
            "state {state_fips}: {} ZCTAs after GEOID-prefix filter",
            filtered.len()
        );
        self.cache.set(
            &key,
            serde_json::Value::Array(filtered.clone()),
            Some(BOUNDARY_TTL),
        );
        Ok(parse_units(&filtered, GeographicLevel::Zcta))
    }

    /// Units of the requested analysis level for one state.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] on fetch failure, or a response error
    /// for levels with no `TIGERweb` layer mapping here.
    pub async fn units_for_state(
        &self,
        level: GeographicLevel,
        state_fips: &str,
    ) -> Result<Vec<GeographicUnit>, BoundaryError> {
        match level {
            GeographicLevel::BlockGroup => self.block_groups_for_state(state_fips).await,
            GeographicLevel::Zcta => self.zctas_for_state(state_fips).await,
            GeographicLevel::County => self.counties_for_state(state_fips).await,
            other => Err(BoundaryError::Response {
                message: format!("no boundary layer for level '{other}'"),
            }),
        }
    }

    async fn fetch_cached(
        &self,
        level: GeographicLevel,
        state_fips: &str,
        layer: &str,
        where_clause: &str,
    ) -> Result<Vec<serde_json::Value>, BoundaryError> {
        let key = cache_key(&json!({
            "op": "tiger",
            "level": level.to_string(),
            "state": state_fips,
            "year": self.year,
        }));
        self.fetch_features_cached(&key, layer, where_clause).await
    }

    async fn fetch_features_cached(
        &self,
        key: &str,
        layer: &str,
        where_clause: &str,
    ) -> Result<Vec<serde_json::Value>, BoundaryError> {
        if let Some(entry) = self.cache.get(key) {
            if let Some(features) = entry.value.as_array() {
                return Ok(features.clone());
            }
        }

        let features = self.fetch_paginated(layer, where_clause).await?;
        self.cache.set(
            key,
            serde_json::Value::Array(features.clone()),
            Some(BOUNDARY_TTL),
        );
        Ok(features)
    }

    /// Fetches all features from a layer using paginated requests.
    async fn fetch_paginated(
        &self,
        layer: &str,
        where_clause: &str,
    ) -> Result<Vec<serde_json::Value>, BoundaryError> {
        let url = format!("{TIGERWEB_BASE_URL}/{layer}/query");
        let mut all_features: Vec<serde_json::Value> = Vec::new();
        let mut offset = 0u32;

        loop {
            let query = [
                ("where", where_clause.to_string()),
                ("outFields", "*".to_string()),
                ("outSR", "4326".to_string()),
                ("f", "geojson".to_string()),
                ("returnGeometry", "true".to_string()),
                ("resultRecordCount", PAGE_SIZE.to_string()),
                ("resultOffset", offset.to_string()),
            ];

            let body = self
                .http
                .get_json_with_timeout(&url, &query, TIGER_TIMEOUT)
                .await?;

            // ArcGIS reports errors inside a 200 response.
            if let Some(error) = body.get("error") {
                return Err(BoundaryError::Response {
                    message: format!("ArcGIS error from {layer}: {error}"),
                });
            }

            let features = body["features"]
                .as_array()
                .ok_or_else(|| BoundaryError::Response {
                    message: format!("no features array from {layer} (offset={offset})"),
                })?;

            if features.is_empty() {
                break;
            }

            #[allow(clippy::cast_possible_truncation)]
            let page_len = features.len() as u32;
            all_features.extend(features.iter().cloned());

            let exceeded = body
                .get("exceededTransferLimit")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if !exceeded {
                break;
            }

            offset += page_len;
            log::debug!(
                "{layer}: fetched {page_len} features (total {}), next page at offset {offset}",
                all_features.len()
            );
        }

        Ok(all_features)
    }
}

/// Parses ArcGIS `GeoJSON` features into geographic units, dropping
/// features with missing identifiers or unrepairable geometry.
fn parse_units(features: &[serde_json::Value], level: GeographicLevel) -> Vec<GeographicUnit> {
    let mut units = Vec::with_capacity(features.len());
    let mut dropped = 0usize;

    for feature in features {
        match parse_unit(feature, level) {
            Some(unit) => units.push(unit),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::warn!("dropped {dropped} {level} features with missing identifiers or bad geometry");
    }
    units
}

/// Parses a single feature, standardizing `TIGERweb` attribute names.
fn parse_unit(feature: &serde_json::Value, level: GeographicLevel) -> Option<GeographicUnit> {
    let props = &feature["properties"];

    let state_fips = string_prop(props, "STATE")
        .or_else(|| string_prop(props, "STATEFP"))
        .map(|s| format!("{s:0>2}"));
    let county_fips = string_prop(props, "COUNTY")
        .or_else(|| string_prop(props, "COUNTYFP"))
        .map(|s| format!("{s:0>3}"));
    let tract_code = string_prop(props, "TRACT")
        .or_else(|| string_prop(props, "TRACTCE"))
        .map(|s| format!("{s:0>6}"));
    let block_group_code = string_prop(props, "BLKGRP").or_else(|| string_prop(props, "BLKGRPCE"));

    let geoid = match level {
        GeographicLevel::Zcta => zcta_geoid_of(feature)?,
        GeographicLevel::BlockGroup => string_prop(props, "GEOID").or_else(|| {
            Some(block_group_geoid(
                state_fips.as_deref()?,
                county_fips.as_deref()?,
                tract_code.as_deref()?,
                block_group_code.as_deref()?,
            ))
        })?,
        _ => string_prop(props, "GEOID")
            .or_else(|| Some(format!("{}{}", state_fips.clone()?, county_fips.clone()?)))?,
    };

    if !level.matches(&geoid) {
        log::debug!("skipping {level} feature with malformed GEOID '{geoid}'");
        return None;
    }

    let geometry = geometry::parse_feature_geometry(&feature["geometry"])?;
    let geometry = geometry::repair_geometry(geometry)?;

    let name = string_prop(props, "NAME").or_else(|| string_prop(props, "BASENAME"));

    Some(GeographicUnit {
        level,
        geoid,
        name,
        state_fips,
        county_fips,
        tract_code,
        block_group_code,
        geometry,
    })
}

/// Extracts a ZCTA GEOID, accepting either `GEOID` or `ZCTA5` columns.
fn zcta_geoid_of(feature: &serde_json::Value) -> Option<String> {
    let props = &feature["properties"];
    string_prop(props, "GEOID").or_else(|| string_prop(props, "ZCTA5"))
}

/// Reads a property as a non-empty string, accepting numeric values.
fn string_prop(props: &serde_json::Value, key: &str) -> Option<String> {
    match &props[key] {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(x0: f64, y0: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [x0, y0], [x0 + 0.1, y0], [x0 + 0.1, y0 + 0.1], [x0, y0 + 0.1], [x0, y0]
            ]]
        })
    }

    #[test]
    fn parses_block_group_feature() {
        let feature = json!({
            "properties": {
                "GEOID": "371830524042",
                "STATE": "37",
                "COUNTY": "183",
                "TRACT": "052404",
                "BLKGRP": "2",
                "NAME": "Block Group 2"
            },
            "geometry": square(-78.7, 35.7)
        });
        let unit = parse_unit(&feature, GeographicLevel::BlockGroup).unwrap();
        assert_eq!(unit.geoid, "371830524042");
        assert_eq!(unit.state_fips.as_deref(), Some("37"));
        assert!(unit.components_agree());
    }

    #[test]
    fn synthesizes_geoid_from_components() {
        let feature = json!({
            "properties": {
                "STATE": "37",
                "COUNTY": "183",
                "TRACT": "52404",
                "BLKGRP": "2"
            },
            "geometry": square(-78.7, 35.7)
        });
        let unit = parse_unit(&feature, GeographicLevel::BlockGroup).unwrap();
        assert_eq!(unit.geoid, "371830524042");
    }

    #[test]
    fn zcta_accepts_zcta5_column() {
        let feature = json!({
            "properties": {"ZCTA5": "27601", "BASENAME": "27601"},
            "geometry": square(-78.7, 35.7)
        });
        let unit = parse_unit(&feature, GeographicLevel::Zcta).unwrap();
        assert_eq!(unit.geoid, "27601");
        assert_eq!(unit.name.as_deref(), Some("27601"));
    }

    #[test]
    fn missing_identifiers_drop_the_feature() {
        let feature = json!({
            "properties": {"NAME": "mystery"},
            "geometry": square(0.0, 0.0)
        });
        assert!(parse_unit(&feature, GeographicLevel::BlockGroup).is_none());
    }

    #[test]
    fn malformed_geoid_drops_the_feature() {
        let feature = json!({
            "properties": {"GEOID": "37", "STATE": "37"},
            "geometry": square(0.0, 0.0)
        });
        assert!(parse_unit(&feature, GeographicLevel::BlockGroup).is_none());
    }

    #[test]
    fn counties_parse_with_basename() {
        let feature = json!({
            "properties": {"GEOID": "37183", "STATE": "37", "COUNTY": "183", "BASENAME": "Wake"},
            "geometry": square(-78.9, 35.6)
        });
        let unit = parse_unit(&feature, GeographicLevel::County).unwrap();
        assert_eq!(unit.geoid, "37183");
        assert_eq!(unit.name.as_deref(), Some("Wake"));
    }
}
