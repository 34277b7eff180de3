//! Groups pending records by grid cell.

use std::collections::BTreeMap;

use geofill_location_models::{Coordinate, PendingRecord};

use crate::grid::{ClusterKey, GridIndex};

/// Pending records that snap to the same cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    key: ClusterKey,
    representative: Coordinate,
    records: Vec<PendingRecord>,
}

impl Cluster {
    fn new(key: ClusterKey, first: PendingRecord) -> Self {
        Self {
            key,
            representative: first.coordinate,
            records: vec![first],
        }
    }

    /// Cell shared by every record.
    #[must_use]
    pub const fn key(&self) -> ClusterKey {
        self.key
    }

    /// Raw coordinate of the first record. Used for the external lookup.
    #[must_use]
    pub const fn representative(&self) -> Coordinate {
        self.representative
    }

    /// Records in input order.
    #[must_use]
    pub fn records(&self) -> &[PendingRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always `false`; a cluster is created from its first record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition of the pending records, in the order cells were first seen.
#[derive(Debug, Clone, Default)]
pub struct Clusters {
    clusters: Vec<Cluster>,
    index: BTreeMap<ClusterKey, usize>,
}

impl Clusters {
    /// Assigns every record to the cluster of its cell.
    #[must_use]
    pub fn build(records: &[PendingRecord], grid: &GridIndex) -> Self {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut index: BTreeMap<ClusterKey, usize> = BTreeMap::new();

        for record in records {
            let key = grid.cell_of(record.coordinate);
            if let Some(&i) = index.get(&key) {
                clusters[i].records.push(*record);
            } else {
                index.insert(key, clusters.len());
                clusters.push(Cluster::new(key, *record));
            }
        }

        Self { clusters, index }
    }

    /// Returns the cluster for `key`, if any record fell into it.
    #[must_use]
    pub fn get(&self, key: ClusterKey) -> Option<&Cluster> {
        self.index.get(&key).map(|&i| &self.clusters[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// Number of distinct cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of records across all clusters.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }
}
