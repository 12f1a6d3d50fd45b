//! Typed run configuration and validation.
//!
//! Everything the pipeline accepts is spelled out here; validation
//! runs before any network I/O so bad input fails fast with
//! remediation suggestions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use socialmapper_cache::CacheConfig;
use socialmapper_census::variables;
use socialmapper_geocoder::{GeocodingProvider, MatchQuality};
use socialmapper_geography::RepositoryType;
use socialmapper_geography_models::{GeographicLevel, StateFormat, normalize_state};
use socialmapper_isochrone::{IsochroneOptions, TravelMode};
use socialmapper_poi::{validate_poi_name, validate_poi_type};

use crate::error::PipelineError;

/// Where POIs come from.
#[derive(Debug, Clone)]
pub enum PoiSourceConfig {
    /// Query OpenStreetMap via Overpass.
    Osm {
        /// Named area to search (e.g. "Raleigh").
        geocode_area: String,
        /// State identifier in any format.
        state: Option<String>,
        /// City override; defaults to the geocode area.
        city: Option<String>,
        /// OSM key (must be in the closed POI type set).
        poi_type: String,
        /// OSM value (`[a-z0-9_]+`).
        poi_name: String,
        /// Extra tag filters.
        additional_tags: BTreeMap<String, String>,
    },
    /// Read coordinates from a CSV/JSON file.
    CustomFile {
        /// File path.
        path: PathBuf,
        /// Name column override.
        name_field: Option<String>,
        /// Type column override.
        type_field: Option<String>,
    },
    /// Geocode an address CSV.
    Addresses {
        /// File path.
        path: PathBuf,
        /// Address column override.
        address_field: Option<String>,
        /// Name column override.
        name_field: Option<String>,
        /// Geocoding provider.
        provider: GeocodingProvider,
        /// Advisory minimum match quality.
        min_quality: MatchQuality,
    },
}

/// Which outputs to write.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ExportOptions {
    /// Write the enriched dataset as CSV.
    pub csv: bool,
    /// Create the maps output directory (rendering is external).
    pub maps: bool,
    /// Write isochrones as GeoJSON.
    pub isochrones: bool,
}

/// Infrastructure knobs shared by every component.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Cache variant and sizing.
    pub cache: CacheConfig,
    /// Token-bucket fill rate per host, requests per minute.
    pub rate_limit_rpm: u32,
    /// Default per-request timeout in seconds.
    pub api_timeout_s: u64,
    /// Retry budget for transient HTTP failures.
    pub max_retries: u32,
    /// TTL for cached census data responses, seconds.
    pub cache_ttl_s: u64,
    /// Persistence backend for the neighbor store.
    pub repository_type: RepositoryType,
    /// Abort when more than this fraction of POIs fail a step.
    pub max_failure_ratio: f64,
    /// ACS year to query.
    pub census_year: u16,
    /// ACS dataset identifier.
    pub census_dataset: String,
    /// Clustering and network-download options.
    pub isochrone: IsochroneOptions,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            rate_limit_rpm: 60,
            api_timeout_s: 30,
            max_retries: 3,
            cache_ttl_s: 3600,
            repository_type: RepositoryType::Memory,
            max_failure_ratio: 1.0,
            census_year: 2023,
            census_dataset: "acs/acs5".to_string(),
            isochrone: IsochroneOptions::default(),
        }
    }
}

/// Full configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// POI source.
    pub poi_source: PoiSourceConfig,
    /// Travel-time budget in minutes (1–60).
    pub travel_time: u32,
    /// Travel mode.
    pub travel_mode: TravelMode,
    /// Analysis geography level (block group or ZCTA).
    pub geographic_level: GeographicLevel,
    /// Census variables, as human names or ACS codes.
    pub census_variables: Vec<String>,
    /// Census API key; falls back to `CENSUS_API_KEY`.
    pub api_key: Option<String>,
    /// Output directory root.
    pub output_dir: PathBuf,
    /// Enabled exports.
    pub exports: ExportOptions,
    /// Random subsample cap on the POI batch.
    pub max_poi_count: Option<usize>,
    /// Infrastructure options.
    pub core: CoreOptions,
}

impl RunConfig {
    /// Validates the configuration before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] (or
    /// [`PipelineError::InvalidLocation`]) describing the first
    /// problem found, with remediation suggestions.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=60).contains(&self.travel_time) {
            return Err(PipelineError::Configuration {
                message: format!(
                    "travel_time must be between 1 and 60 minutes (got {})",
                    self.travel_time
                ),
                suggestions: vec!["choose a travel time between 1 and 60".to_string()],
            });
        }

        if !matches!(
            self.geographic_level,
            GeographicLevel::BlockGroup | GeographicLevel::Zcta
        ) {
            return Err(PipelineError::Configuration {
                message: format!(
                    "geographic_level must be block-group or zcta (got {})",
                    self.geographic_level
                ),
                suggestions: vec!["use block-group or zcta".to_string()],
            });
        }

        if self.census_variables.is_empty() {
            return Err(PipelineError::Configuration {
                message: "at least one census variable is required".to_string(),
                suggestions: vec![
                    "try total_population or median_household_income".to_string(),
                ],
            });
        }
        for variable in &self.census_variables {
            if !variables::validate(variable) {
                return Err(PipelineError::Configuration {
                    message: format!("unknown census variable '{variable}'"),
                    suggestions: vec![
                        "use a known name like total_population".to_string(),
                        "or an ACS code like B01003_001E".to_string(),
                    ],
                });
            }
        }

        if !(0.0..=1.0).contains(&self.core.max_failure_ratio) {
            return Err(PipelineError::Configuration {
                message: format!(
                    "max_failure_ratio must be in [0, 1] (got {})",
                    self.core.max_failure_ratio
                ),
                suggestions: vec!["use a fraction between 0.0 and 1.0".to_string()],
            });
        }

        if !(2021..=2023).contains(&self.core.census_year) {
            return Err(PipelineError::Configuration {
                message: format!(
                    "census_year must be 2021-2023 (got {})",
                    self.core.census_year
                ),
                suggestions: vec!["use an ACS 5-year vintage between 2021 and 2023".to_string()],
            });
        }

        self.validate_poi_source()
    }

    fn validate_poi_source(&self) -> Result<(), PipelineError> {
        match &self.poi_source {
            PoiSourceConfig::Osm {
                geocode_area,
                state,
                poi_type,
                poi_name,
                ..
            } => {
                if geocode_area.trim().is_empty() {
                    return Err(PipelineError::Configuration {
                        message: "geocode_area must not be empty".to_string(),
                        suggestions: vec!["name a city or area, e.g. \"Raleigh\"".to_string()],
                    });
                }
                validate_poi_type(poi_type).map_err(|e| PipelineError::Configuration {
                    message: e.to_string(),
                    suggestions: vec!["common types: amenity, shop, leisure".to_string()],
                })?;
                validate_poi_name(poi_name).map_err(|e| PipelineError::Configuration {
                    message: e.to_string(),
                    suggestions: vec!["use lowercase OSM values, e.g. library".to_string()],
                })?;
                if let Some(state) = state {
                    if normalize_state(state, StateFormat::Abbreviation).is_none() {
                        return Err(PipelineError::InvalidLocation {
                            location: state.clone(),
                            suggestions: vec![
                                "use a full state name (North Carolina)".to_string(),
                                "or a two-letter abbreviation (NC)".to_string(),
                                "or a two-digit FIPS code (37)".to_string(),
                            ],
                        });
                    }
                }
                Ok(())
            }
            PoiSourceConfig::CustomFile { path, .. }
            | PoiSourceConfig::Addresses { path, .. } => {
                if path.exists() {
                    Ok(())
                } else {
                    Err(PipelineError::Configuration {
                        message: format!("input file not found: {}", path.display()),
                        suggestions: vec!["check the path and working directory".to_string()],
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
        RunConfig {
            poi_source: PoiSourceConfig::Osm {
                geocode_area: "Raleigh".to_string(),
                state: Some("North Carolina".to_string()),
                city: None,
                poi_type: "amenity".to_string(),
                poi_name: "library".to_string(),
                additional_tags: BTreeMap::new(),
            },
            travel_time: 15,
            travel_mode: TravelMode::Drive,
            geographic_level: GeographicLevel::BlockGroup,
            census_variables: vec!["total_population".to_string()],
            api_key: None,
            output_dir: PathBuf::from("output"),
            exports: ExportOptions {
                csv: true,
                maps: false,
                isochrones: false,
            },
            max_poi_count: None,
            core: CoreOptions::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_travel_time_is_rejected() {
        let mut config = base_config();
        config.travel_time = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn travel_time_bounds() {
        let mut config = base_config();
        config.travel_time = 60;
        assert!(config.validate().is_ok());
        config.travel_time = 61;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tract_level_is_rejected() {
        let mut config = base_config();
        config.geographic_level = GeographicLevel::Tract;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let mut config = base_config();
        config.census_variables = vec!["population".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn acs_codes_are_accepted() {
        let mut config = base_config();
        config.census_variables = vec!["B01003_001E".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unresolvable_state_is_invalid_location() {
        let mut config = base_config();
        config.poi_source = PoiSourceConfig::Osm {
            geocode_area: "Springfield".to_string(),
            state: Some("Oceania".to_string()),
            city: None,
            poi_type: "amenity".to_string(),
            poi_name: "library".to_string(),
            additional_tags: BTreeMap::new(),
        };
        match config.validate() {
            Err(PipelineError::InvalidLocation { suggestions, .. }) => {
                assert!(!suggestions.is_empty());
            }
            other => panic!("expected InvalidLocation, got {other:?}"),
        }
    }

    #[test]
    fn missing_custom_file_is_rejected() {
        let mut config = base_config();
        config.poi_source = PoiSourceConfig::CustomFile {
            path: PathBuf::from("/nonexistent/points.csv"),
            name_field: None,
            type_field: None,
        };
        assert!(config.validate().is_err());
    }
}
