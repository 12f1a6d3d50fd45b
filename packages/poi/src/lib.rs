#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! POI acquisition.
//!
//! Three sources implement the [`PoiSource`] trait and are chosen by
//! enum at construction:
//!
//! - [`osm::OsmPoiSource`] queries OpenStreetMap through Overpass,
//! - [`custom::CustomFileSource`] ingests CSV/JSON coordinate files,
//! - [`addresses::AddressFileSource`] geocodes an address CSV.
//!
//! Every source returns a [`PoiExtraction`]: the valid batch plus the
//! rows it rejected, so the caller can feed the invalid-data tracker.

pub mod addresses;
pub mod custom;
pub mod osm;

use async_trait::async_trait;
use socialmapper_poi_models::PoiBatch;
use thiserror::Error;

/// The closed set of OSM keys accepted as a POI type.
pub const POI_TYPES: &[&str] = &[
    "amenity",
    "shop",
    "tourism",
    "leisure",
    "healthcare",
    "education",
    "public_transport",
    "office",
    "craft",
    "emergency",
];

/// Errors from POI acquisition.
#[derive(Debug, Error)]
pub enum PoiError {
    /// Overpass request failed after retries.
    #[error("Overpass HTTP error: {0}")]
    Http(#[from] socialmapper_http::HttpError),

    /// Address geocoding failed at the transport level.
    #[error("address geocoding failed: {0}")]
    Geocode(#[from] socialmapper_geocoder::GeocodeError),

    /// Input file could not be read.
    #[error("POI file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV structure was unreadable.
    #[error("POI CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON structure was unreadable.
    #[error("POI JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The POI spec or file contents were invalid.
    #[error("invalid POI input: {message}")]
    Invalid {
        /// What was wrong.
        message: String,
    },
}

/// A record a source could not turn into a usable POI.
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    /// The offending input, as close to raw as practical.
    pub data: serde_json::Value,
    /// Why it was rejected.
    pub reason: String,
}

/// What a source produces: the good rows and the rejects.
#[derive(Debug, Clone, Default)]
pub struct PoiExtraction {
    /// Valid POIs plus batch metadata.
    pub batch: PoiBatch,
    /// Rows dropped during extraction, with reasons.
    pub rejected: Vec<RejectedRecord>,
}

/// A producer of POI batches.
#[async_trait]
pub trait PoiSource: Send + Sync {
    /// Produces the batch, recording per-row rejections instead of
    /// failing on them.
    ///
    /// # Errors
    ///
    /// Returns [`PoiError`] only for whole-source failures (network,
    /// unreadable file, invalid spec).
    async fn produce(&self) -> Result<PoiExtraction, PoiError>;

    /// Stem used for output files produced from this source.
    fn base_filename(&self) -> String;
}

/// Validates a POI type against the closed set.
///
/// # Errors
///
/// Returns [`PoiError::Invalid`] for unknown types.
pub fn validate_poi_type(poi_type: &str) -> Result<(), PoiError> {
    if POI_TYPES.contains(&poi_type) {
        Ok(())
    } else {
        Err(PoiError::Invalid {
            message: format!(
                "unknown POI type '{poi_type}' (expected one of: {})",
                POI_TYPES.join(", ")
            ),
        })
    }
}

/// Validates a POI name: lowercase alphanumerics and underscores.
///
/// # Errors
///
/// Returns [`PoiError::Invalid`] for anything else.
pub fn validate_poi_name(poi_name: &str) -> Result<(), PoiError> {
    let ok = !poi_name.is_empty()
        && poi_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PoiError::Invalid {
            message: format!("invalid POI name '{poi_name}' (expected [a-z0-9_]+)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poi_type_validation() {
        assert!(validate_poi_type("amenity").is_ok());
        assert!(validate_poi_type("emergency").is_ok());
        assert!(validate_poi_type("building").is_err());
    }

    #[test]
    fn poi_name_validation() {
        assert!(validate_poi_name("library").is_ok());
        assert!(validate_poi_name("fire_station").is_ok());
        assert!(validate_poi_name("caf\u{e9}").is_err());
        assert!(validate_poi_name("Library").is_err());
        assert!(validate_poi_name("").is_err());
    }
}
