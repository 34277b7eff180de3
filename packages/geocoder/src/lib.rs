#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse-geocoding client for geofill.
//!
//! Turns a coordinate into a structured street address. The only shipped
//! provider is the **Google Maps Geocoding API** (paid beyond a monthly
//! free tier), configured via the TOML files in `services/` and loaded
//! through the [`service_registry`].
//!
//! Callers program against the [`ReverseGeocoder`] trait so the
//! deduplication engine can be exercised without network access.

pub mod google;
pub mod service_registry;

use async_trait::async_trait;
use geofill_location_models::{AddressComponents, Coordinate};
use thiserror::Error;

use crate::service_registry::{GeocodingService, ProviderConfig};

/// A successfully reverse-geocoded address.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseGeocodedAddress {
    /// Formatted, single-line address as returned by the provider.
    pub display_name: String,
    /// Structured address parts.
    pub components: AddressComponents,
    /// The provider's result object, verbatim.
    pub raw: serde_json::Value,
}

/// Errors from reverse-geocoding operations.
///
/// Every variant is a per-lookup failure; none of them is fatal to a run.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (connection, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider reported a non-OK API status.
    #[error("API status: {status} - {message}")]
    Api {
        /// Provider status code (e.g. `REQUEST_DENIED`).
        status: String,
        /// Provider error message, if any.
        message: String,
    },

    /// Provider returned no results for the coordinate.
    #[error("No results")]
    NoResults,

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs carry the API key.
        Self::Http(e.without_url())
    }
}

/// A provider that resolves a coordinate to an address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Service identifier (matches the registry `id`).
    fn id(&self) -> &str;

    /// Resolves `coordinate` to an address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider cannot produce a usable
    /// result for the coordinate.
    async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> Result<ReverseGeocodedAddress, GeocodeError>;
}

/// Builds the client for a configured service.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the HTTP client cannot be constructed.
pub fn build_geocoder(
    service: &GeocodingService,
    api_key: String,
) -> Result<Box<dyn ReverseGeocoder>, GeocodeError> {
    match &service.provider {
        ProviderConfig::GoogleMaps {
            base_url,
            timeout_secs,
        } => {
            let client = google::GoogleGeocoder::new(
                &service.id,
                base_url,
                api_key,
                std::time::Duration::from_secs(*timeout_secs),
            )?;
            Ok(Box::new(client))
        }
    }
}
