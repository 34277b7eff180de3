//! Compile-time registry of reverse-geocoding service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The registry
//! embeds these at compile time and exposes them via [`all_services`],
//! [`enabled_services`], and [`find_service`].

use serde::Deserialize;

/// A reverse-geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"google"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
    /// Billing model used for the run report's cost estimate.
    pub pricing: Pricing,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Maps Geocoding API.
    GoogleMaps {
        /// Endpoint URL (e.g., `"https://maps.googleapis.com/maps/api/geocode/json"`).
        base_url: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

/// Per-call billing for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Pricing {
    /// Price of one call once the free tier is exceeded, in US dollars.
    pub cost_per_call_usd: f64,
    /// Calls per month covered by the free tier.
    pub free_tier_calls: u64,
}

impl Pricing {
    /// Estimated cost of `calls` lookups.
    ///
    /// Once the free tier is exceeded every call is billed; below it the
    /// estimate is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self, calls: u64) -> f64 {
        if calls > self.free_tier_calls {
            calls as f64 * self.cost_per_call_usd
        } else {
            0.0
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::GoogleMaps { base_url, .. } => base_url,
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[("google", include_str!("../services/google.toml"))];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 1;

/// Returns all service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by id.
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by(|a, b| a.id.cmp(&b.id));
    services
}

/// Looks up an enabled service by id.
#[must_use]
pub fn find_service(id: &str) -> Option<GeocodingService> {
    enabled_services().into_iter().find(|s| s.id == id)
}
