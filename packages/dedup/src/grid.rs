//! Fixed-size coordinate grid.
//!
//! A coordinate belongs to the cell whose centre is the nearest multiple of
//! the grid size on each axis. Cells are identified by integer indices so
//! that two coordinates in the same cell always produce an identical
//! [`ClusterKey`], independent of floating-point noise in the snapped
//! degree values.
//!
//! Rounding is round-half-to-even on `degrees / grid_size`; a coordinate
//! exactly on a cell boundary goes to the cell with the even index.

use geofill_location_models::Coordinate;
use serde::Serialize;

use crate::DedupError;

/// Default grid size in degrees (≈55 m of latitude).
pub const DEFAULT_GRID_SIZE: f64 = 0.0005;

/// Smallest accepted grid size (≈1 cm). Keeps every cell index of a
/// valid coordinate well inside the range an `f64` holds exactly.
pub const MIN_GRID_SIZE: f64 = 1e-7;

/// Approximate length of one degree of latitude in metres.
const METRES_PER_DEGREE: f64 = 111_000.0;

/// Decimal places kept when storing a snapped coordinate.
const STORED_DECIMALS: i32 = 6;

/// Identifies one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterKey {
    /// `round(latitude / grid_size)`.
    pub lat_cell: i64,
    /// `round(longitude / grid_size)`.
    pub lng_cell: i64,
}

/// Maps coordinates to cells at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridIndex {
    size: f64,
}

impl GridIndex {
    /// Creates a grid with cells `size` degrees wide.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::Config`] if `size` is not finite or is smaller
    /// than [`MIN_GRID_SIZE`].
    pub fn new(size: f64) -> Result<Self, DedupError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(DedupError::Config {
                message: format!("Grid size must be a positive number of degrees, got {size}"),
            });
        }
        if size < MIN_GRID_SIZE {
            return Err(DedupError::Config {
                message: format!("Grid size must be at least {MIN_GRID_SIZE} degrees, got {size}"),
            });
        }
        Ok(Self { size })
    }

    /// Cell width in degrees.
    #[must_use]
    pub const fn size(&self) -> f64 {
        self.size
    }

    /// Returns the cell containing `coordinate`.
    #[must_use]
    pub fn cell_of(&self, coordinate: Coordinate) -> ClusterKey {
        ClusterKey {
            lat_cell: cell_index(coordinate.latitude, self.size),
            lng_cell: cell_index(coordinate.longitude, self.size),
        }
    }

    /// Returns the grid-aligned coordinate of a cell, rounded for storage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapped(&self, key: ClusterKey) -> Coordinate {
        Coordinate::new(
            round_stored(key.lat_cell as f64 * self.size),
            round_stored(key.lng_cell as f64 * self.size),
        )
    }

    /// Approximate `(north-south, east-west)` cell size in metres at
    /// `latitude`.
    #[must_use]
    pub fn cell_dimensions_m(&self, latitude: f64) -> (f64, f64) {
        let north_south = self.size * METRES_PER_DEGREE;
        (north_south, north_south * latitude.to_radians().cos())
    }
}

impl Default for GridIndex {
    fn default() -> Self {
        Self {
            size: DEFAULT_GRID_SIZE,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cell_index(degrees: f64, size: f64) -> i64 {
    (degrees / size).round_ties_even() as i64
}

fn round_stored(degrees: f64) -> f64 {
    let scale = 10f64.powi(STORED_DECIMALS);
    (degrees * scale).round_ties_even() / scale
}
