//! Snapshot of already resolved addresses, indexed by grid cell.
//!
//! When several existing addresses fall into the same cell, the one with
//! the lowest id is kept. The snapshot is sorted before indexing, so the
//! winner does not depend on the order the store returned rows in.

use std::collections::BTreeMap;

use geofill_location_models::{ExistingLocation, LocationId};

use crate::grid::{ClusterKey, GridIndex};

/// Addresses available for reuse during one run.
#[derive(Debug, Clone, Default)]
pub struct LocationCatalog {
    cells: BTreeMap<ClusterKey, LocationId>,
}

impl LocationCatalog {
    /// Indexes `existing` on `grid`.
    #[must_use]
    pub fn build(grid: &GridIndex, existing: &[ExistingLocation]) -> Self {
        let mut sorted: Vec<&ExistingLocation> = existing.iter().collect();
        sorted.sort_by_key(|location| location.id);

        let mut cells = BTreeMap::new();
        for location in sorted {
            cells
                .entry(grid.cell_of(location.coordinate))
                .or_insert(location.id);
        }

        log::debug!(
            "Catalog: {} existing address(es) across {} cell(s)",
            existing.len(),
            cells.len()
        );

        Self { cells }
    }

    /// Returns the address reusable for `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: ClusterKey) -> Option<LocationId> {
        self.cells.get(&key).copied()
    }

    /// Makes `location` reusable for `key` for the rest of the run.
    ///
    /// An existing entry is never replaced. Returns `false` in that case.
    pub fn register(&mut self, key: ClusterKey, location: LocationId) -> bool {
        match self.cells.entry(key) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(location);
                true
            }
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
