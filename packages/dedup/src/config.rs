//! Operating parameters for a deduplication run.

use std::time::Duration;

use geofill_geocoder::service_registry::Pricing;

use crate::DedupError;
use crate::grid::{DEFAULT_GRID_SIZE, GridIndex};

/// Display-name fragment identifying the placeholder address.
pub const DEFAULT_PLACEHOLDER_MARKER: &str = "Pending Geocode";

/// Successful lookups between intermediate commits.
pub const DEFAULT_COMMIT_EVERY: u64 = 50;

/// Pause between consecutive external lookups.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    /// Grid cell size in degrees.
    pub grid_size: f64,
    /// Pause between consecutive external lookups. Never applied to reuse.
    pub delay: Duration,
    /// Report projected work without writing or calling the provider.
    pub dry_run: bool,
    /// Commit lookup results after this many successful lookups.
    pub commit_every: u64,
    /// Substring of the placeholder address's display name.
    pub placeholder_marker: String,
    /// Billing model for the cost estimate.
    pub pricing: Pricing,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            delay: DEFAULT_DELAY,
            dry_run: false,
            commit_every: DEFAULT_COMMIT_EVERY,
            placeholder_marker: DEFAULT_PLACEHOLDER_MARKER.to_string(),
            pricing: Pricing {
                cost_per_call_usd: 0.005,
                free_tier_calls: 10_000,
            },
        }
    }
}

impl DedupConfig {
    /// Checks every parameter and returns the grid it describes.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::Config`] for a non-positive grid size, a zero
    /// commit cadence, or an empty placeholder marker.
    pub fn validate(&self) -> Result<GridIndex, DedupError> {
        let grid = GridIndex::new(self.grid_size)?;

        if self.commit_every == 0 {
            return Err(DedupError::Config {
                message: "Commit cadence must be at least 1".to_string(),
            });
        }

        if self.placeholder_marker.trim().is_empty() {
            return Err(DedupError::Config {
                message: "Placeholder marker must not be empty".to_string(),
            });
        }

        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let grid = DedupConfig::default().validate().unwrap();
        assert!((grid.size() - DEFAULT_GRID_SIZE).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_commit_cadence_is_rejected() {
        let config = DedupConfig {
            commit_every: 0,
            ..DedupConfig::default()
        };
        assert!(matches!(config.validate(), Err(DedupError::Config { .. })));
    }

    #[test]
    fn blank_marker_is_rejected() {
        let config = DedupConfig {
            placeholder_marker: "  ".to_string(),
            ..DedupConfig::default()
        };
        assert!(matches!(config.validate(), Err(DedupError::Config { .. })));
    }

    #[test]
    fn bad_grid_size_is_rejected() {
        let config = DedupConfig {
            grid_size: -1.0,
            ..DedupConfig::default()
        };
        assert!(matches!(config.validate(), Err(DedupError::Config { .. })));
    }
}
