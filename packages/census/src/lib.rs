#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census variable mapping and ACS data retrieval.
//!
//! [`variables`] maps human-readable names ("`total_population`") to
//! ACS variable codes ("`B01003_001E`") and back. [`data`] fetches
//! values from the Census Data API, batching requests by geography,
//! caching responses, and coercing the Bureau's sentinel values to
//! null.

pub mod data;
pub mod variables;

pub use data::{CensusDataPoint, CensusDataService};

use thiserror::Error;

/// Errors from census data operations.
#[derive(Debug, Error)]
pub enum CensusError {
    /// HTTP request failed after retries.
    #[error("census API HTTP error: {0}")]
    Http(#[from] socialmapper_http::HttpError),

    /// Response shape did not match the Data API contract.
    #[error("census API response error: {message}")]
    Response {
        /// Description of what was malformed.
        message: String,
    },

    /// A variable name/code was not recognized.
    #[error("unknown census variable: {variable}")]
    UnknownVariable {
        /// The offending input.
        variable: String,
    },

    /// An ACS data request was attempted with no API key configured.
    #[error("census API key missing; set CENSUS_API_KEY or pass api_key")]
    MissingApiKey,
}
