//! Pipeline assembly and execution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::IndexedRandom;
use serde_json::json;
use socialmapper_boundaries::{BoundaryService, GeographicUnit};
use socialmapper_cache::{CacheProvider, build_provider};
use socialmapper_census::{CensusDataService, variables};
use socialmapper_geocoder::Geocoder;
use socialmapper_geography::{NeighborStore, build_repository};
use socialmapper_geography_models::{StateFormat, normalize_state};
use socialmapper_http::{CancelToken, HttpClientConfig, RateLimitedClient};
use socialmapper_isochrone::{Isochrone, IsochroneEngine, IsochroneError};
use socialmapper_poi::addresses::{AddressFileSource, AddressSourceConfig};
use socialmapper_poi::custom::CustomFileSource;
use socialmapper_poi::osm::{OsmPoiSource, OsmPoiSpec};
use socialmapper_poi::{PoiError, PoiExtraction, PoiSource};
use socialmapper_poi_models::Poi;

use crate::config::{PoiSourceConfig, RunConfig};
use crate::error::{PipelineError, Stage};
use crate::export::{EnrichedRow, write_dataset_csv, write_isochrones_geojson};
use crate::tracker::{InvalidDataTracker, TrackerSummary};

/// Center and sampling metadata for a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    /// Mean POI latitude.
    pub center_lat: f64,
    /// Mean POI longitude.
    pub center_lon: f64,
    /// Travel-time budget of the run.
    pub travel_time: u32,
    /// Whether the POI batch was subsampled.
    pub sampled: bool,
    /// POI count before subsampling, when sampled.
    pub original_count: Option<usize>,
}

/// What a pipeline run returns.
#[derive(Debug, Default)]
pub struct RunResult {
    /// POIs analyzed (after validation and sampling).
    pub poi_count: usize,
    /// Geographic units in the final dataset.
    pub units_analyzed: usize,
    /// Output files, keyed by kind (`csv`, `isochrones`, ...).
    pub files_generated: BTreeMap<String, PathBuf>,
    /// Center and sampling metadata.
    pub metadata: RunMetadata,
    /// Rejection counts, when anything was rejected.
    pub invalid_summary: Option<TrackerSummary>,
}

/// Builds the dependency container for a [`Pipeline`].
pub struct SocialMapperBuilder {
    config: RunConfig,
}

impl SocialMapperBuilder {
    /// Starts a builder from a run configuration.
    #[must_use]
    pub const fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Validates the configuration and assembles every dependency.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for invalid configuration or a
    /// repository that cannot be opened.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let config = self.config;
        config.validate()?;

        let cancel = CancelToken::new();
        let http = RateLimitedClient::new(
            HttpClientConfig {
                requests_per_minute: config.core.rate_limit_rpm,
                timeout: Duration::from_secs(config.core.api_timeout_s),
                max_retries: config.core.max_retries,
                ..HttpClientConfig::default()
            },
            cancel.clone(),
        )
        .map_err(|e| PipelineError::from_http(Stage::Setup, e))?;

        let cache: Arc<dyn CacheProvider> = build_provider(&config.core.cache);
        let geocoder = Arc::new(Geocoder::new(http.clone(), Arc::clone(&cache)));
        let boundaries = Arc::new(BoundaryService::new(
            http.clone(),
            Arc::clone(&cache),
            config.core.census_year,
        ));

        let repository =
            build_repository(&config.core.repository_type).map_err(|e| {
                PipelineError::DataProcessing {
                    stage: Stage::Setup,
                    message: format!("failed to open neighbor repository: {e}"),
                }
            })?;
        let neighbors = Arc::new(
            NeighborStore::new(repository, Arc::clone(&geocoder), Arc::clone(&boundaries))
                .map_err(|e| PipelineError::DataProcessing {
                    stage: Stage::Setup,
                    message: format!("failed to seed neighbor store: {e}"),
                })?,
        );

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("CENSUS_API_KEY").ok());
        let census = Arc::new(CensusDataService::new(
            http.clone(),
            Arc::clone(&cache),
            api_key,
            config.core.census_year,
            config.core.census_dataset.clone(),
            Duration::from_secs(config.core.cache_ttl_s),
        ));

        Ok(Pipeline {
            config,
            http,
            geocoder,
            boundaries,
            neighbors,
            census,
            cancel,
            tracker: InvalidDataTracker::new(),
        })
    }
}

/// The assembled pipeline: configuration plus every dependency.
pub struct Pipeline {
    config: RunConfig,
    http: RateLimitedClient,
    geocoder: Arc<Geocoder>,
    boundaries: Arc<BoundaryService>,
    neighbors: Arc<NeighborStore>,
    census: Arc<CensusDataService>,
    cancel: CancelToken,
    tracker: InvalidDataTracker,
}

impl Pipeline {
    /// Token that aborts in-flight work at the next suspension point.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the full analysis.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`PipelineError`]; per-item failures
    /// land in the invalid-data report instead.
    pub async fn run(&self) -> Result<RunResult, PipelineError> {
        let started = Instant::now();

        // [1/7] Environment.
        let directories = self.setup_environment()?;
        self.tracker.reset();

        // [2/7] POIs.
        let (pois, base_filename, states, metadata) = self.extract_pois().await?;
        log::info!("[2/7] {} POIs ready ({base_filename})", pois.len());

        // [3/7] Isochrones.
        let isochrones = self.generate_isochrones(&pois).await?;
        log::info!("[3/7] {} isochrones generated", isochrones.len());

        // [4/7] Candidate units.
        let units = self.candidate_units(&pois, &states, &isochrones).await?;
        log::info!("[4/7] {} candidate units intersect", units.len());

        // [5/7] Distances.
        let engine = socialmapper_distance::DistanceEngine::default();
        let distances = engine
            .add_travel_distances(&units, &pois, self.config.travel_time)
            .map_err(|e| PipelineError::DataProcessing {
                stage: Stage::Distances,
                message: e.to_string(),
            })?;
        log::info!("[5/7] distances computed for {} units", distances.len());

        // [6/7] Census data.
        let (rows, variable_columns) = self.integrate_census_data(distances).await?;
        log::info!("[6/7] census data merged onto {} rows", rows.len());

        // [7/7] Report.
        let result = self.write_outputs(
            &directories,
            &base_filename,
            &rows,
            &variable_columns,
            &isochrones,
            &pois,
            metadata,
        )?;

        log::info!(
            "pipeline complete in {:.1}s ({} rows)",
            started.elapsed().as_secs_f64(),
            result.units_analyzed
        );
        Ok(result)
    }

    /// Creates the output directory tree for the enabled exports.
    fn setup_environment(&self) -> Result<BTreeMap<String, PathBuf>, PipelineError> {
        let mut directories = BTreeMap::new();
        let base = &self.config.output_dir;

        let mut wanted: Vec<(&str, bool)> = vec![("base", true)];
        wanted.push(("csv", self.config.exports.csv));
        wanted.push(("maps", self.config.exports.maps));
        wanted.push(("isochrones", self.config.exports.isochrones));

        for (kind, enabled) in wanted {
            if !enabled {
                continue;
            }
            let path = if kind == "base" {
                base.clone()
            } else {
                base.join(kind)
            };
            std::fs::create_dir_all(&path).map_err(|e| PipelineError::DataProcessing {
                stage: Stage::Setup,
                message: format!("failed to create {}: {e}", path.display()),
            })?;
            directories.insert(kind.to_string(), path);
        }
        Ok(directories)
    }

    /// Extracts, validates, and optionally subsamples the POI batch.
    async fn extract_pois(
        &self,
    ) -> Result<(Vec<Poi>, String, Vec<String>, RunMetadata), PipelineError> {
        let source = self.poi_source();
        let base_filename = source.base_filename();

        let extraction = source.produce().await.map_err(lift_poi_error)?;
        let PoiExtraction { batch, rejected } = extraction;
        for reject in rejected {
            self.tracker
                .add_invalid_point(reject.data, &reject.reason, "poi-extraction");
        }

        // Coordinate validation gates the rest of the pipeline.
        let mut pois = Vec::with_capacity(batch.pois.len());
        for poi in batch.pois {
            if poi.has_valid_coordinates() {
                pois.push(poi);
            } else {
                self.tracker.add_invalid_point(
                    json!({"id": poi.id, "lat": poi.lat, "lon": poi.lon}),
                    "coordinates out of range",
                    "coordinate-validation",
                );
            }
        }

        if pois.is_empty() {
            return Err(PipelineError::NoDataFound {
                stage: Stage::PoiExtraction,
                message: "no POIs with valid coordinates".to_string(),
                suggestions: vec![
                    "try a different POI type or name".to_string(),
                    "check the input file's coordinate columns".to_string(),
                ],
            });
        }

        // Uniform random subsample when the cap is exceeded.
        let mut metadata = RunMetadata {
            travel_time: self.config.travel_time,
            ..RunMetadata::default()
        };
        if let Some(cap) = self.config.max_poi_count {
            if pois.len() > cap {
                let original = pois.len();
                let mut rng = rand::rng();
                pois = pois.choose_multiple(&mut rng, cap).cloned().collect();
                metadata.sampled = true;
                metadata.original_count = Some(original);
                log::info!("sampled {cap} POIs from {original} total");
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let n = pois.len() as f64;
        metadata.center_lat = pois.iter().map(|p| p.lat).sum::<f64>() / n;
        metadata.center_lon = pois.iter().map(|p| p.lon).sum::<f64>() / n;

        Ok((pois, base_filename, batch.metadata.states, metadata))
    }

    /// Instantiates the configured POI source.
    fn poi_source(&self) -> Box<dyn PoiSource> {
        match &self.config.poi_source {
            PoiSourceConfig::Osm {
                geocode_area,
                state,
                city,
                poi_type,
                poi_name,
                additional_tags,
            } => {
                let spec = OsmPoiSpec {
                    geocode_area: geocode_area.clone(),
                    state: state.clone(),
                    city: city.clone(),
                    poi_type: poi_type.clone(),
                    poi_name: poi_name.clone(),
                    additional_tags: additional_tags.clone(),
                };
                // The spec was validated with the config.
                OsmPoiSource::new(self.http.clone(), spec).map_or_else(
                    |_| unreachable!("OSM spec revalidation failed after config validation"),
                    |source| Box::new(source) as Box<dyn PoiSource>,
                )
            }
            PoiSourceConfig::CustomFile {
                path,
                name_field,
                type_field,
            } => Box::new(CustomFileSource::new(
                path.clone(),
                name_field.clone(),
                type_field.clone(),
            )),
            PoiSourceConfig::Addresses {
                path,
                address_field,
                name_field,
                provider,
                min_quality,
            } => Box::new(AddressFileSource::new(
                Arc::clone(&self.geocoder),
                AddressSourceConfig {
                    path: path.clone(),
                    address_field: address_field.clone(),
                    name_field: name_field.clone(),
                    provider: *provider,
                    min_quality: *min_quality,
                },
            )),
        }
    }

    /// Generates isochrones and applies the failure-ratio gate.
    async fn generate_isochrones(&self, pois: &[Poi]) -> Result<Vec<Isochrone>, PipelineError> {
        let mut options = self.config.core.isochrone.clone();
        options.travel_mode = self.config.travel_mode;

        let engine = IsochroneEngine::new(self.http.clone(), options);
        let run = engine
            .generate(pois, self.config.travel_time)
            .await
            .map_err(|e| match e {
                IsochroneError::Http(http) => PipelineError::from_http(Stage::Isochrones, http),
                IsochroneError::NoPois => PipelineError::NoDataFound {
                    stage: Stage::Isochrones,
                    message: "no POIs to process".to_string(),
                    suggestions: vec![],
                },
            })?;

        let mut failed_pois = 0usize;
        for reject in run.rejected {
            if reject.data.get("cluster_id").is_some() {
                self.tracker
                    .add_invalid_cluster(reject.data, &reject.reason, "isochrones");
            } else {
                failed_pois += 1;
                self.tracker
                    .add_invalid_point(reject.data, &reject.reason, "isochrones");
            }
        }

        if run.isochrones.is_empty() {
            return Err(PipelineError::NoDataFound {
                stage: Stage::Isochrones,
                message: "no isochrones could be generated".to_string(),
                suggestions: vec![
                    "check network connectivity to Overpass".to_string(),
                    "verify the POIs sit on a routable road network".to_string(),
                ],
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let failure_ratio = failed_pois as f64 / pois.len() as f64;
        if failure_ratio > self.config.core.max_failure_ratio {
            return Err(PipelineError::DataProcessing {
                stage: Stage::Isochrones,
                message: format!(
                    "{failed_pois} of {} POIs failed ({:.0}% > {:.0}% allowed)",
                    pois.len(),
                    failure_ratio * 100.0,
                    self.config.core.max_failure_ratio * 100.0
                ),
            });
        }

        Ok(run.isochrones)
    }

    /// Resolves candidate units: POI counties → states → level units →
    /// intersection with the isochrone union.
    async fn candidate_units(
        &self,
        pois: &[Poi],
        batch_states: &[String],
        isochrones: &[Isochrone],
    ) -> Result<Vec<GeographicUnit>, PipelineError> {
        let points: Vec<(f64, f64)> = pois.iter().map(|p| (p.lat, p.lon)).collect();
        let counties = self
            .neighbors
            .counties_of_pois(&points, false, 0)
            .await
            .map_err(|e| PipelineError::DataProcessing {
                stage: Stage::CandidateUnits,
                message: format!("county resolution failed: {e}"),
            })?;

        let mut states: BTreeSet<String> =
            counties.iter().map(|(state, _)| state.clone()).collect();
        for state in batch_states {
            if let Some(fips) = normalize_state(state, StateFormat::Fips) {
                states.insert(fips);
            }
        }

        if states.is_empty() {
            return Err(PipelineError::NoDataFound {
                stage: Stage::CandidateUnits,
                message: "no states could be resolved for the POIs".to_string(),
                suggestions: vec!["check that the POIs are inside the United States".to_string()],
            });
        }
        log::info!(
            "fetching {} units for states: {:?}",
            self.config.geographic_level,
            states
        );

        let mut all_units = Vec::new();
        for state in &states {
            match self
                .boundaries
                .units_for_state(self.config.geographic_level, state)
                .await
            {
                Ok(units) => all_units.extend(units),
                Err(e) => {
                    log::error!("boundary fetch failed for state {state}: {e}");
                    self.tracker.add_processing_error(
                        json!({"state": state}),
                        &format!("boundary fetch failed: {e}"),
                        "candidate-units",
                    );
                }
            }
        }

        let result = socialmapper_spatial::filter_intersecting_units(all_units, isochrones);
        for dropped in result.dropped {
            self.tracker.add_processing_error(
                json!({"geoid": dropped.geoid}),
                &dropped.reason,
                "candidate-units",
            );
        }

        if result.units.is_empty() {
            return Err(PipelineError::NoDataFound {
                stage: Stage::CandidateUnits,
                message: "no geographic units intersect the isochrones".to_string(),
                suggestions: vec![
                    "increase the travel time".to_string(),
                    "check that the POIs are inside the United States".to_string(),
                ],
            });
        }
        Ok(result.units)
    }

    /// Fetches census values and merges them onto the distance rows.
    async fn integrate_census_data(
        &self,
        distances: Vec<socialmapper_distance::UnitDistance>,
    ) -> Result<(Vec<EnrichedRow>, Vec<String>), PipelineError> {
        // Config validation guarantees these normalize.
        let codes: Vec<String> = self
            .config
            .census_variables
            .iter()
            .filter_map(|v| variables::normalize(v).ok())
            .collect();
        let readable_names: Vec<String> =
            codes.iter().map(|code| variables::readable(code)).collect();

        let geoids: Vec<String> = distances.iter().map(|d| d.geoid.clone()).collect();
        let points = self
            .census
            .fetch(&geoids, &codes, self.config.geographic_level)
            .await
            .map_err(|e| match e {
                socialmapper_census::CensusError::MissingApiKey => PipelineError::MissingApiKey,
                socialmapper_census::CensusError::Http(http) => {
                    PipelineError::from_http(Stage::CensusData, http)
                }
                other => PipelineError::DataProcessing {
                    stage: Stage::CensusData,
                    message: other.to_string(),
                },
            })?;

        if points.is_empty() {
            return Err(PipelineError::NoDataFound {
                stage: Stage::CensusData,
                message: "census API returned no rows for the candidate units".to_string(),
                suggestions: vec![
                    "verify the CENSUS_API_KEY is valid".to_string(),
                    "try a different ACS year".to_string(),
                ],
            });
        }

        // GEOID-keyed upsert; merge order does not matter.
        let mut values_by_geoid: BTreeMap<String, BTreeMap<String, Option<f64>>> = BTreeMap::new();
        for point in points {
            let name = variables::readable(&point.variable_code);
            values_by_geoid
                .entry(point.geoid)
                .or_default()
                .insert(name, point.value);
        }

        let mut rows: Vec<EnrichedRow> = distances
            .into_iter()
            .map(|distance| {
                let values = values_by_geoid.remove(&distance.geoid).unwrap_or_default();
                EnrichedRow { distance, values }
            })
            .collect();
        rows.sort_by(|a, b| a.distance.geoid.cmp(&b.distance.geoid));

        Ok((rows, readable_names))
    }

    /// Writes the enabled exports and assembles the run result.
    #[allow(clippy::too_many_arguments)]
    fn write_outputs(
        &self,
        directories: &BTreeMap<String, PathBuf>,
        base_filename: &str,
        rows: &[EnrichedRow],
        variable_columns: &[String],
        isochrones: &[Isochrone],
        pois: &[Poi],
        metadata: RunMetadata,
    ) -> Result<RunResult, PipelineError> {
        let mut files_generated = BTreeMap::new();
        let stem = format!("{base_filename}_{}min", self.config.travel_time);

        if let Some(csv_dir) = directories.get("csv") {
            let path = csv_dir.join(format!("{stem}_census_data.csv"));
            write_dataset_csv(&path, rows, variable_columns).map_err(|e| {
                PipelineError::DataProcessing {
                    stage: Stage::Report,
                    message: format!("CSV export failed: {e}"),
                }
            })?;
            log::info!("wrote {}", path.display());
            files_generated.insert("csv".to_string(), path);
        }

        if let Some(iso_dir) = directories.get("isochrones") {
            let path = iso_dir.join(format!("{stem}_isochrones.geojson"));
            write_isochrones_geojson(&path, isochrones).map_err(|e| {
                PipelineError::DataProcessing {
                    stage: Stage::Report,
                    message: format!("isochrone export failed: {e}"),
                }
            })?;
            log::info!("wrote {}", path.display());
            files_generated.insert("isochrones".to_string(), path);
        }

        let summary = self.tracker.summary();
        let invalid_summary = if summary.is_empty() {
            None
        } else {
            match self.tracker.write_report(&self.config.output_dir, &stem) {
                Ok(report_files) => {
                    for (index, path) in report_files.into_iter().enumerate() {
                        files_generated.insert(format!("invalid_report_{index}"), path);
                    }
                }
                Err(e) => log::warn!("could not write invalid-data report: {e}"),
            }
            Some(summary)
        };

        Ok(RunResult {
            poi_count: pois.len(),
            units_analyzed: rows.len(),
            files_generated,
            metadata,
            invalid_summary,
        })
    }
}

/// Lifts a POI-source error into the pipeline taxonomy.
fn lift_poi_error(error: PoiError) -> PipelineError {
    match error {
        PoiError::Http(e) => PipelineError::from_http(Stage::PoiExtraction, e),
        PoiError::Geocode(e) => PipelineError::ExternalService {
            host: "geocoding.geo.census.gov".to_string(),
            status: None,
            stage: Stage::PoiExtraction,
            message: e.to_string(),
        },
        other => PipelineError::DataProcessing {
            stage: Stage::PoiExtraction,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoreOptions, ExportOptions};
    use socialmapper_cache::CacheStrategy;
    use socialmapper_geography_models::GeographicLevel;
    use socialmapper_isochrone::TravelMode;
    use std::collections::BTreeMap;
    use geo::polygon;

    fn offline_config(output_dir: PathBuf) -> RunConfig {
        let mut core = CoreOptions::default();
        core.cache.strategy = CacheStrategy::Memory;
        RunConfig {
            poi_source: PoiSourceConfig::Osm {
                geocode_area: "Raleigh".to_string(),
                state: Some("NC".to_string()),
                city: None,
                poi_type: "amenity".to_string(),
                poi_name: "library".to_string(),
                additional_tags: BTreeMap::new(),
            },
            travel_time: 15,
            travel_mode: TravelMode::Drive,
            geographic_level: GeographicLevel::BlockGroup,
            census_variables: vec!["total_population".to_string()],
            api_key: Some("test-key".to_string()),
            output_dir,
            exports: ExportOptions {
                csv: true,
                maps: true,
                isochrones: true,
            },
            max_poi_count: None,
            core,
        }
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path().to_path_buf());
        config.travel_time = 0;
        assert!(matches!(
            SocialMapperBuilder::new(config).build(),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn builder_assembles_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = SocialMapperBuilder::new(offline_config(dir.path().to_path_buf()))
            .build()
            .unwrap();
        assert!(!pipeline.cancel_token().is_cancelled());
    }

    #[test]
    fn setup_creates_requested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = SocialMapperBuilder::new(offline_config(dir.path().to_path_buf()))
            .build()
            .unwrap();
        let directories = pipeline.setup_environment().unwrap();
        assert!(directories["csv"].is_dir());
        assert!(directories["maps"].is_dir());
        assert!(directories["isochrones"].is_dir());
    }

    #[test]
    fn write_outputs_produces_csv_and_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = SocialMapperBuilder::new(offline_config(dir.path().to_path_buf()))
            .build()
            .unwrap();
        let directories = pipeline.setup_environment().unwrap();

        let rows = vec![EnrichedRow {
            distance: socialmapper_distance::UnitDistance {
                geoid: "371830524042".to_string(),
                centroid_lat: 35.78,
                centroid_lon: -78.64,
                poi_id: Some("1".to_string()),
                poi_name: Some("Library".to_string()),
                travel_time_minutes: 15,
                avg_travel_speed_kmh: 50.0,
                avg_travel_speed_mph: 31.0,
                travel_distance_km: Some(1.0),
                travel_distance_miles: Some(0.621_371),
            },
            values: BTreeMap::from([("total_population".to_string(), Some(1204.0))]),
        }];
        let isochrones = vec![Isochrone {
            poi_id: "1".to_string(),
            poi_name: "Library".to_string(),
            travel_time_minutes: 15,
            polygon: polygon![
                (x: -78.7, y: 35.7), (x: -78.6, y: 35.7),
                (x: -78.6, y: 35.8), (x: -78.7, y: 35.7)
            ],
            avg_travel_speed_kmh: 50.0,
            avg_travel_speed_mph: 31.0,
        }];

        let result = pipeline
            .write_outputs(
                &directories,
                "raleigh_amenity_library",
                &rows,
                &["total_population".to_string()],
                &isochrones,
                &[],
                RunMetadata::default(),
            )
            .unwrap();

        assert_eq!(result.units_analyzed, 1);
        assert!(result.files_generated["csv"].exists());
        assert!(result.files_generated["isochrones"].exists());
        assert!(result.invalid_summary.is_none());
        let csv_name = result.files_generated["csv"]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert_eq!(csv_name, "raleigh_amenity_library_15min_census_data.csv");
    }
}
