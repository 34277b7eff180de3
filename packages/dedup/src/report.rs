//! Counters collected during a run and their console rendering.

use std::collections::BTreeMap;
use std::fmt;

use geofill_location_models::{LocationId, RecordKind};
use serde::Serialize;

/// Why a run ended before clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NothingToDo {
    /// No address carries the placeholder marker.
    NoPlaceholder,
    /// The placeholder exists but no record references it.
    NoPendingRecords,
}

/// Outcome of one run.
///
/// In a dry run the lookup counters stay at zero and `lookup_clusters` /
/// `lookup_records` describe the projected work instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub grid_size: f64,
    /// Set when the run stopped early.
    pub nothing_to_do: Option<NothingToDo>,
    pub placeholder: Option<LocationId>,
    pub pending_by_kind: BTreeMap<RecordKind, u64>,
    pub pending_total: u64,
    /// Distinct grid cells among the pending records.
    pub clusters: u64,
    /// Existing addresses with a coordinate.
    pub existing_locations: u64,
    /// Clusters resolved from the catalog.
    pub reuse_clusters: u64,
    /// Records in those clusters.
    pub reuse_records: u64,
    /// Records actually pointed at a catalog address.
    pub reuse_records_updated: u64,
    /// Clusters that needed a lookup.
    pub lookup_clusters: u64,
    /// Records in those clusters.
    pub lookup_records: u64,
    /// Provider calls made.
    pub lookups_attempted: u64,
    /// Provider calls that produced no usable address.
    pub lookups_failed: u64,
    /// Records pointed at a newly created address.
    pub lookup_records_updated: u64,
    /// References left on the placeholder after the run.
    pub placeholder_references_remaining: Option<u64>,
    pub placeholder_removed: bool,
    pub estimated_cost_usd: f64,
}

impl RunReport {
    /// Provider calls made, or projected in a dry run.
    #[must_use]
    pub const fn billable_calls(&self) -> u64 {
        if self.dry_run {
            self.lookup_clusters
        } else {
            self.lookups_attempted
        }
    }

    /// Records that received a real address during this run.
    #[must_use]
    pub const fn records_updated(&self) -> u64 {
        if self.dry_run {
            0
        } else {
            self.reuse_records_updated + self.lookup_records_updated
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.nothing_to_do {
            Some(NothingToDo::NoPlaceholder) => {
                return writeln!(f, "No placeholder address found. Nothing to geocode.");
            }
            Some(NothingToDo::NoPendingRecords) => {
                return writeln!(
                    f,
                    "No pending records found. Everything is already geocoded."
                );
            }
            None => {}
        }

        writeln!(f, "Pending records: {} total", self.pending_total)?;
        for kind in RecordKind::ALL {
            let count = self.pending_by_kind.get(&kind).copied().unwrap_or(0);
            writeln!(f, "  {:<13} {count}", format!("{}:", kind.label()))?;
        }
        writeln!(f, "Unique location clusters: {}", self.clusters)?;
        writeln!(f, "Existing geocoded addresses: {}", self.existing_locations)?;
        writeln!(f)?;

        let (verb, reused) = if self.dry_run {
            ("Would resolve", self.reuse_records)
        } else {
            ("Resolved", self.reuse_records_updated)
        };
        writeln!(
            f,
            "{verb} from existing: {reused} records ({} locations, 0 API calls)",
            self.reuse_clusters
        )?;

        if self.dry_run {
            writeln!(
                f,
                "Would geocode via API:  {} records ({} API calls)",
                self.lookup_records, self.lookup_clusters
            )?;
        } else {
            writeln!(
                f,
                "Geocoded via API:       {} records ({} API calls)",
                self.lookup_records_updated, self.lookups_attempted
            )?;
            if self.lookups_failed > 0 {
                writeln!(
                    f,
                    "Errors:                 {} locations failed",
                    self.lookups_failed
                )?;
            }
            match self.placeholder_references_remaining {
                Some(0) if self.placeholder_removed => {
                    writeln!(f, "Placeholder address removed.")?;
                }
                Some(remaining) if remaining > 0 => writeln!(
                    f,
                    "{remaining} records still reference the placeholder (lookup errors)"
                )?,
                _ => {}
            }
        }

        writeln!(f, "Estimated cost:         ${:.2}", self.estimated_cost_usd)
    }
}
