#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The SocialMapper pipeline.
//!
//! [`Pipeline::run`] sequences the whole analysis: extract POIs,
//! generate isochrones, find the census units the isochrones touch,
//! enrich them with travel distances and demographics, and write the
//! final dataset. Dependencies (HTTP client, caches, geocoder,
//! neighbor store, boundary and census services) live in an explicit
//! container assembled by [`SocialMapperBuilder`] — nothing is looked
//! up through globals.

mod config;
mod error;
mod export;
mod run;
mod tracker;

pub use config::{CoreOptions, ExportOptions, PoiSourceConfig, RunConfig};
pub use error::{PipelineError, Stage};
pub use run::{Pipeline, RunMetadata, RunResult, SocialMapperBuilder};
pub use tracker::{InvalidDataTracker, InvalidRecord, TrackerSummary};
