#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for SocialMapper.
//!
//! Maps flags onto a [`socialmapper_pipeline::RunConfig`], runs the
//! pipeline, and prints the result summary. Analysis logic lives in
//! the library crates; this binary only parses and reports.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use socialmapper_cache::{CacheConfig, CacheStrategy};
use socialmapper_geocoder::{GeocodingProvider, MatchQuality};
use socialmapper_geography::RepositoryType;
use socialmapper_geography_models::GeographicLevel;
use socialmapper_isochrone::TravelMode;
use socialmapper_pipeline::{
    CoreOptions, ExportOptions, PoiSourceConfig, RunConfig, SocialMapperBuilder,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Walk,
    Bike,
    Drive,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    BlockGroup,
    Zcta,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CacheArg {
    Memory,
    File,
    Hybrid,
    None,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Census,
    Nominatim,
    Auto,
}

/// Community accessibility analysis from points of interest.
#[derive(Debug, Parser)]
#[command(name = "socialmapper", version, about)]
struct Cli {
    /// Named area to search for POIs (e.g. "Raleigh").
    #[arg(long)]
    area: Option<String>,

    /// State for the area, in any format (NC / North Carolina / 37).
    #[arg(long)]
    state: Option<String>,

    /// OSM POI type (amenity, shop, leisure, ...).
    #[arg(long)]
    poi_type: Option<String>,

    /// OSM POI name (library, hospital, ...).
    #[arg(long)]
    poi_name: Option<String>,

    /// CSV/JSON file with custom coordinates (alternative to --area).
    #[arg(long, conflicts_with = "area")]
    custom_coords: Option<PathBuf>,

    /// CSV file with addresses to geocode (alternative to --area).
    #[arg(long, conflicts_with_all = ["area", "custom_coords"])]
    addresses: Option<PathBuf>,

    /// Geocoding provider for --addresses.
    #[arg(long, value_enum, default_value = "auto")]
    geocoding_provider: ProviderArg,

    /// Travel time budget in minutes (1-60).
    #[arg(long, default_value_t = 15)]
    travel_time: u32,

    /// Travel mode.
    #[arg(long, value_enum, default_value = "drive")]
    travel_mode: ModeArg,

    /// Geographic unit level for the analysis.
    #[arg(long, value_enum, default_value = "block-group")]
    level: LevelArg,

    /// Census variables (names or ACS codes).
    #[arg(long, num_args = 1.., default_values_t = ["total_population".to_string()])]
    census_variables: Vec<String>,

    /// Census API key (defaults to the CENSUS_API_KEY env var).
    #[arg(long)]
    api_key: Option<String>,

    /// Output directory.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Skip the CSV export.
    #[arg(long)]
    no_csv: bool,

    /// Also export isochrones as GeoJSON.
    #[arg(long)]
    export_isochrones: bool,

    /// Cap the POI count with a uniform random sample.
    #[arg(long)]
    max_poi_count: Option<usize>,

    /// Cache backend.
    #[arg(long, value_enum, default_value = "hybrid")]
    cache_strategy: CacheArg,

    /// SQLite file for the neighbor store (in-memory when omitted).
    #[arg(long)]
    neighbor_db: Option<PathBuf>,

    /// Requests per minute allowed per upstream host.
    #[arg(long, default_value_t = 60)]
    rate_limit_rpm: u32,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig, String> {
        let poi_source = if let Some(path) = self.addresses {
            PoiSourceConfig::Addresses {
                path,
                address_field: None,
                name_field: None,
                provider: match self.geocoding_provider {
                    ProviderArg::Census => GeocodingProvider::Census,
                    ProviderArg::Nominatim => GeocodingProvider::Nominatim,
                    ProviderArg::Auto => GeocodingProvider::Auto,
                },
                min_quality: MatchQuality::Approximate,
            }
        } else if let Some(path) = self.custom_coords {
            PoiSourceConfig::CustomFile {
                path,
                name_field: None,
                type_field: None,
            }
        } else {
            let (Some(geocode_area), Some(poi_type), Some(poi_name)) =
                (self.area, self.poi_type, self.poi_name)
            else {
                return Err(
                    "either --custom-coords, --addresses, or all of --area, --poi-type, \
                     and --poi-name are required"
                        .to_string(),
                );
            };
            PoiSourceConfig::Osm {
                geocode_area,
                state: self.state,
                city: None,
                poi_type,
                poi_name,
                additional_tags: BTreeMap::new(),
            }
        };

        let mut core = CoreOptions {
            rate_limit_rpm: self.rate_limit_rpm,
            ..CoreOptions::default()
        };
        core.cache = CacheConfig {
            strategy: match self.cache_strategy {
                CacheArg::Memory => CacheStrategy::Memory,
                CacheArg::File => CacheStrategy::File,
                CacheArg::Hybrid => CacheStrategy::Hybrid,
                CacheArg::None => CacheStrategy::None,
            },
            ..CacheConfig::default()
        };
        core.repository_type = self
            .neighbor_db
            .map_or(RepositoryType::Memory, RepositoryType::Sqlite);

        Ok(RunConfig {
            poi_source,
            travel_time: self.travel_time,
            travel_mode: match self.travel_mode {
                ModeArg::Walk => TravelMode::Walk,
                ModeArg::Bike => TravelMode::Bike,
                ModeArg::Drive => TravelMode::Drive,
            },
            geographic_level: match self.level {
                LevelArg::BlockGroup => GeographicLevel::BlockGroup,
                LevelArg::Zcta => GeographicLevel::Zcta,
            },
            census_variables: self.census_variables,
            api_key: self.api_key,
            output_dir: self.output_dir,
            exports: ExportOptions {
                csv: !self.no_csv,
                maps: false,
                isochrones: self.export_isochrones,
            },
            max_poi_count: self.max_poi_count,
            core,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match SocialMapperBuilder::new(config).build() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run().await {
        Ok(result) => {
            println!("Analyzed {} POIs", result.poi_count);
            println!("Units in dataset: {}", result.units_analyzed);
            println!(
                "Center: ({:.4}, {:.4})",
                result.metadata.center_lat, result.metadata.center_lon
            );
            if result.metadata.sampled {
                println!(
                    "Sampled from {} POIs",
                    result.metadata.original_count.unwrap_or_default()
                );
            }
            for (kind, path) in &result.files_generated {
                println!("  {kind}: {}", path.display());
            }
            if let Some(summary) = &result.invalid_summary {
                println!(
                    "Invalid data: {} points, {} clusters, {} errors (see report)",
                    summary.total_invalid_points,
                    summary.total_invalid_clusters,
                    summary.total_processing_errors
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &socialmapper_pipeline::PipelineError) {
    eprintln!("error [{}]: {error}", error.stage());
    for suggestion in error.suggestions() {
        eprintln!("  hint: {suggestion}");
    }
}
