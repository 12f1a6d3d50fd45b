//! The geocoder service: provider fallback + result caching.

use std::sync::Arc;

use serde_json::json;
use socialmapper_cache::{CacheProvider, cache_key};
use socialmapper_http::RateLimitedClient;

use crate::{GeocodeError, GeocodeResult, GeocodedAddress, GeocodingProvider, MatchQuality};

/// Geocoder with point-result caching and provider fallback for
/// addresses.
pub struct Geocoder {
    http: RateLimitedClient,
    cache: Arc<dyn CacheProvider>,
}

impl Geocoder {
    /// Builds a geocoder over the shared client and cache.
    #[must_use]
    pub const fn new(http: RateLimitedClient, cache: Arc<dyn CacheProvider>) -> Self {
        Self { http, cache }
    }

    /// Resolves a point to its census geographies.
    ///
    /// Results are cached per exact `(lat, lon)` with no expiry:
    /// census geography assignments only change between vintages, and
    /// the cache directory is the invalidation boundary for those.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] only for transport failures;
    /// unparseable payloads come back as an empty result so callers can
    /// continue with nulls.
    pub async fn geocode_point(&self, lat: f64, lon: f64) -> Result<GeocodeResult, GeocodeError> {
        let key = cache_key(&json!({
            "op": "geocode_point",
            "lat": lat,
            "lon": lon,
        }));

        if let Some(entry) = self.cache.get(&key) {
            if let Ok(result) = serde_json::from_value::<GeocodeResult>(entry.value) {
                return Ok(result);
            }
        }

        let result = crate::census::geocode_point(&self.http, lat, lon).await?;

        if !result.is_empty() {
            if let Ok(value) = serde_json::to_value(&result) {
                self.cache.set(&key, value, None);
            }
        }

        Ok(result)
    }

    /// Geocodes a free-form address using the requested provider.
    ///
    /// `Auto` tries the Census geocoder first and falls back to
    /// Nominatim on a miss. `min_quality` is advisory: matches below it
    /// are still returned, with a warning, so callers can decide.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when every attempted provider fails at
    /// the transport or parse level (a clean "no match" is `Ok(None)`).
    pub async fn geocode_address(
        &self,
        address: &str,
        provider: GeocodingProvider,
        min_quality: MatchQuality,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let matched = match provider {
            GeocodingProvider::Census => crate::census::geocode_address(&self.http, address).await?,
            GeocodingProvider::Nominatim => {
                crate::nominatim::geocode_freeform(&self.http, address).await?
            }
            GeocodingProvider::Auto => {
                match crate::census::geocode_address(&self.http, address).await {
                    Ok(Some(hit)) => Some(hit),
                    Ok(None) => {
                        log::debug!("census geocoder missed '{address}', trying Nominatim");
                        crate::nominatim::geocode_freeform(&self.http, address).await?
                    }
                    Err(e) => {
                        log::warn!("census geocoder failed for '{address}': {e}");
                        crate::nominatim::geocode_freeform(&self.http, address).await?
                    }
                }
            }
        };

        if let Some(hit) = &matched {
            if hit.match_quality > min_quality {
                log::warn!(
                    "match for '{address}' is {:?}, below requested {:?}",
                    hit.match_quality,
                    min_quality
                );
            }
        }

        Ok(matched)
    }
}
