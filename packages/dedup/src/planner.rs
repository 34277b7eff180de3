//! Decides how each cluster gets its address.
//!
//! A cluster moves from unresolved to exactly one terminal state:
//!
//! * [`Resolution::Reused`]: the catalog already holds an address for the
//!   cell. No external call.
//! * [`Resolution::LookedUp`]: one provider call with the cluster's
//!   representative coordinate. The new address is stored at the snapped
//!   cell coordinate and registered in the catalog.
//! * [`Resolution::Failed`]: the provider produced nothing usable. The
//!   cluster's records keep pointing at the placeholder until a later run.

use std::time::Duration;

use geofill_database::StoreTransaction;
use geofill_geocoder::ReverseGeocoder;
use geofill_location_models::{LocationId, NewLocation};

use crate::DedupError;
use crate::catalog::LocationCatalog;
use crate::cluster::{Cluster, Clusters};
use crate::grid::GridIndex;

/// Terminal state of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved from the catalog.
    Reused(LocationId),
    /// Resolved by a new provider lookup.
    LookedUp(LocationId),
    /// Lookup failed; carries the provider's reason.
    Failed(String),
}

impl Resolution {
    /// The resolved address, unless the cluster failed.
    #[must_use]
    pub const fn location(&self) -> Option<LocationId> {
        match self {
            Self::Reused(id) | Self::LookedUp(id) => Some(*id),
            Self::Failed(_) => None,
        }
    }
}

/// Clusters split by how they will be resolved.
#[derive(Debug, Default)]
pub struct Plan<'a> {
    /// Clusters with a catalog match, paired with the matched address.
    pub reuse: Vec<(&'a Cluster, LocationId)>,
    /// Clusters that need a provider lookup, in cluster order.
    pub lookup: Vec<&'a Cluster>,
}

impl Plan<'_> {
    /// Records that will be resolved from the catalog.
    #[must_use]
    pub fn reuse_records(&self) -> usize {
        self.reuse.iter().map(|(c, _)| c.len()).sum()
    }

    /// Records that depend on a provider lookup.
    #[must_use]
    pub fn lookup_records(&self) -> usize {
        self.lookup.iter().map(|c| c.len()).sum()
    }
}

/// Owns the run's catalog and issues provider lookups.
pub struct ResolutionPlanner<'g> {
    grid: GridIndex,
    catalog: LocationCatalog,
    geocoder: Option<&'g dyn ReverseGeocoder>,
    delay: Duration,
    lookups: u64,
}

impl<'g> ResolutionPlanner<'g> {
    /// Creates a planner. `geocoder` may be `None` when only [`Self::plan`]
    /// is needed (dry runs).
    #[must_use]
    pub const fn new(
        grid: GridIndex,
        catalog: LocationCatalog,
        geocoder: Option<&'g dyn ReverseGeocoder>,
        delay: Duration,
    ) -> Self {
        Self {
            grid,
            catalog,
            geocoder,
            delay,
            lookups: 0,
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &LocationCatalog {
        &self.catalog
    }

    /// Provider calls issued so far.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.lookups
    }

    /// Splits `clusters` into catalog matches and lookups. Performs no I/O.
    #[must_use]
    pub fn plan<'c>(&self, clusters: &'c Clusters) -> Plan<'c> {
        let mut plan = Plan::default();
        for cluster in clusters.iter() {
            match self.catalog.lookup(cluster.key()) {
                Some(location) => plan.reuse.push((cluster, location)),
                None => plan.lookup.push(cluster),
            }
        }
        plan
    }

    /// Resolves one cluster, consulting the catalog before the provider.
    ///
    /// A successful lookup inserts the new address through `txn`; the
    /// caller owns the commit. Consecutive provider calls are separated by
    /// the configured delay.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError::Config`] if a lookup is needed but no provider
    /// was configured, or [`DedupError::Database`] if the insert fails.
    /// Provider failures are reported as [`Resolution::Failed`].
    pub async fn resolve(
        &mut self,
        cluster: &Cluster,
        txn: &dyn StoreTransaction,
    ) -> Result<Resolution, DedupError> {
        if let Some(location) = self.catalog.lookup(cluster.key()) {
            return Ok(Resolution::Reused(location));
        }

        let geocoder = self.geocoder.ok_or_else(|| DedupError::Config {
            message: "A reverse geocoder is required to resolve new locations".to_string(),
        })?;

        if self.lookups > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.lookups += 1;

        let representative = cluster.representative();
        let address = match geocoder.reverse_geocode(representative).await {
            Ok(address) => address,
            Err(e) => {
                log::warn!(
                    "Lookup failed for {representative} ({} record(s)): {e}",
                    cluster.len()
                );
                return Ok(Resolution::Failed(e.to_string()));
            }
        };

        let location = NewLocation {
            display_name: address.display_name,
            coordinate: self.grid.snapped(cluster.key()),
            components: address.components,
            raw: address.raw,
        };
        let id = txn.insert_location(&location).await?;
        self.catalog.register(cluster.key(), id);

        log::debug!(
            "{representative} -> address {id} \"{}\"",
            location.display_name
        );

        Ok(Resolution::LookedUp(id))
    }
}
