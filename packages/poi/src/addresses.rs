//! Address-list POI source.
//!
//! Reads a CSV with an address column, geocodes each row through the
//! configured provider, and emits a POI per successful match. Failed
//! rows are rejected, not fatal; a geocoder that is unreachable for
//! the whole batch surfaces as an error so the run can stop early.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use socialmapper_geocoder::{Geocoder, GeocodingProvider, MatchQuality};
use socialmapper_poi_models::{BatchMetadata, Poi, PoiBatch};

use crate::{PoiError, PoiExtraction, PoiSource, RejectedRecord};

/// Configuration for the address source.
#[derive(Debug, Clone)]
pub struct AddressSourceConfig {
    /// CSV file with one address per row.
    pub path: PathBuf,
    /// Address column name; defaults to `address`.
    pub address_field: Option<String>,
    /// Optional name column; defaults to the address itself.
    pub name_field: Option<String>,
    /// Provider to use (census, nominatim, or auto fallback).
    pub provider: GeocodingProvider,
    /// Advisory minimum match quality.
    pub min_quality: MatchQuality,
}

/// POI source geocoding an address CSV.
pub struct AddressFileSource {
    geocoder: Arc<Geocoder>,
    config: AddressSourceConfig,
}

impl AddressFileSource {
    /// Builds a source over the shared geocoder.
    #[must_use]
    pub const fn new(geocoder: Arc<Geocoder>, config: AddressSourceConfig) -> Self {
        Self { geocoder, config }
    }
}

#[async_trait]
impl PoiSource for AddressFileSource {
    async fn produce(&self) -> Result<PoiExtraction, PoiError> {
        let mut reader = csv::Reader::from_path(&self.config.path)?;
        let headers = reader.headers()?.clone();

        let address_field = self.config.address_field.as_deref().unwrap_or("address");
        let Some(address_index) = headers.iter().position(|h| h == address_field) else {
            return Err(PoiError::Invalid {
                message: format!(
                    "no '{address_field}' column in {}",
                    self.config.path.display()
                ),
            });
        };
        let name_index = self
            .config
            .name_field
            .as_deref()
            .and_then(|field| headers.iter().position(|h| h == field));

        let mut pois = Vec::new();
        let mut rejected = Vec::new();
        let mut transport_failures = 0usize;
        let mut attempts = 0usize;

        for (row_index, row) in reader.records().enumerate() {
            let row = row?;
            let Some(address) = row.get(address_index).map(str::trim).filter(|a| !a.is_empty())
            else {
                rejected.push(RejectedRecord {
                    data: json!({"row": row_index}),
                    reason: "empty address".to_string(),
                });
                continue;
            };

            attempts += 1;
            match self
                .geocoder
                .geocode_address(address, self.config.provider, self.config.min_quality)
                .await
            {
                Ok(Some(hit)) => {
                    let name = name_index
                        .and_then(|i| row.get(i))
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map_or_else(|| address.to_string(), ToString::to_string);

                    let mut tags = BTreeMap::new();
                    tags.insert("address".to_string(), address.to_string());
                    if let Some(matched) = &hit.matched_address {
                        tags.insert("matched_address".to_string(), matched.clone());
                    }

                    pois.push(Poi {
                        id: format!("address_{row_index}"),
                        name: Some(name),
                        lat: hit.latitude,
                        lon: hit.longitude,
                        poi_type: Some("address".to_string()),
                        tags,
                    });
                }
                Ok(None) => rejected.push(RejectedRecord {
                    data: json!({"row": row_index, "address": address}),
                    reason: "no geocoding match".to_string(),
                }),
                Err(e) => {
                    transport_failures += 1;
                    rejected.push(RejectedRecord {
                        data: json!({"row": row_index, "address": address}),
                        reason: format!("geocoding failed: {e}"),
                    });
                }
            }
        }

        // An unreachable geocoder fails the whole batch rather than
        // silently producing zero POIs.
        if attempts > 0 && transport_failures == attempts {
            return Err(PoiError::Invalid {
                message: format!("geocoder unreachable for all {attempts} addresses"),
            });
        }

        log::info!(
            "geocoded {} of {attempts} addresses from {} ({} rejected)",
            pois.len(),
            self.config.path.display(),
            rejected.len()
        );

        Ok(PoiExtraction {
            batch: PoiBatch {
                pois,
                metadata: BatchMetadata::default(),
            },
            rejected,
        })
    }

    fn base_filename(&self) -> String {
        let stem = self
            .config
            .path
            .file_stem()
            .map_or_else(|| "addresses".to_string(), |s| s.to_string_lossy().to_string());
        format!("custom_{stem}")
    }
}
