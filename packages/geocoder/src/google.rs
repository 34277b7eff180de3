//! Google Maps reverse-geocoding client.
//!
//! Every call is billable once the monthly free tier is used up, so the
//! caller is expected to deduplicate coordinates before calling and to
//! apply its own delay between calls.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-reverse-geocoding>

use std::time::Duration;

use async_trait::async_trait;
use geofill_location_models::{AddressComponents, Coordinate};

use crate::{GeocodeError, ReverseGeocodedAddress, ReverseGeocoder};

/// Maximum length of the response body included in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// Client for the Google Maps Geocoding API `latlng` endpoint.
pub struct GoogleGeocoder {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    /// Creates a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        id: &str,
        base_url: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("geofill/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            id: id.to_string(),
            client,
            base_url: base_url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ReverseGeocoder for GoogleGeocoder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> Result<ReverseGeocodedAddress, GeocodeError> {
        let latlng = format!("{},{}", coordinate.latitude, coordinate.longitude);
        log::debug!("{}: reverse geocoding {latlng}", self.id);
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("{}: rate limited (HTTP 429)", self.id);
            return Err(GeocodeError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeocodeError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_LEN).collect()
}

/// Parses a Geocoding API response, keeping only the first result.
fn parse_response(body: &serde_json::Value) -> Result<ReverseGeocodedAddress, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Missing status in Google response".to_string(),
    })?;

    if status == "ZERO_RESULTS" {
        return Err(GeocodeError::NoResults);
    }
    if status != "OK" {
        return Err(GeocodeError::Api {
            status: status.to_string(),
            message: body["error_message"].as_str().unwrap_or_default().to_string(),
        });
    }

    let Some(first) = body["results"].as_array().and_then(|r| r.first()) else {
        return Err(GeocodeError::NoResults);
    };

    Ok(ReverseGeocodedAddress {
        display_name: first["formatted_address"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        components: extract_components(first),
        raw: first.clone(),
    })
}

/// Maps Google address component types onto [`AddressComponents`].
fn extract_components(result: &serde_json::Value) -> AddressComponents {
    let get = |component_type: &str| component(result, component_type);

    AddressComponents {
        name: get("point_of_interest")
            .or_else(|| get("premise"))
            .or_else(|| get("route")),
        house_number: get("street_number"),
        road: get("route"),
        neighbourhood: get("neighborhood").or_else(|| get("sublocality")),
        city: get("locality").or_else(|| get("sublocality_level_1")),
        county: get("administrative_area_level_2"),
        postcode: get("postal_code"),
        state: get("administrative_area_level_1"),
        state_district: get("administrative_area_level_3"),
        country: get("country"),
    }
}

/// Returns the `long_name` of the first component tagged `component_type`.
fn component(result: &serde_json::Value, component_type: &str) -> Option<String> {
    result["address_components"]
        .as_array()?
        .iter()
        .find(|c| {
            c["types"]
                .as_array()
                .is_some_and(|types| types.iter().any(|t| t.as_str() == Some(component_type)))
        })
        .and_then(|c| c["long_name"].as_str())
        .map(String::from)
}
