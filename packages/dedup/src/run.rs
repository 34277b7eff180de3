//! Run orchestration.
//!
//! A run is three phases, each with its own transaction boundary:
//!
//! 1. **Reuse**: every cluster with a catalog match is written in a single
//!    transaction. Either all reuse assignments become durable or none do.
//! 2. **Lookup**: remaining clusters are looked up one at a time. Results
//!    are committed after every `commit_every` successful lookups and once
//!    at the end, so a crash loses at most `commit_every - 1` completed
//!    lookups.
//! 3. **Cleanup**: the placeholder is deleted in its own transaction, and
//!    only if no record references it anymore.
//!
//! A dry run reads the store, plans, and stops: no transaction is opened
//! and the provider is never called.

use std::sync::Arc;

use geofill_database::{LocationStore, StoreTransaction};
use geofill_geocoder::ReverseGeocoder;
use geofill_location_models::LocationId;

use crate::DedupError;
use crate::catalog::LocationCatalog;
use crate::cluster::{Cluster, Clusters};
use crate::config::DedupConfig;
use crate::fanout;
use crate::planner::{Resolution, ResolutionPlanner};
use crate::progress::{ProgressCallback, null_progress};
use crate::report::{NothingToDo, RunReport};

/// Resolves every pending record the store holds.
///
/// `geocoder` may be `None` only for dry runs.
///
/// # Errors
///
/// Returns [`DedupError::Config`] before touching the store if the
/// configuration is invalid, and [`DedupError::Database`] if a store
/// operation fails. Work committed before the failure stays durable.
#[allow(clippy::too_many_lines)]
pub async fn run(
    store: &dyn LocationStore,
    geocoder: Option<&dyn ReverseGeocoder>,
    config: &DedupConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<RunReport, DedupError> {
    let grid = config.validate()?;
    if !config.dry_run && geocoder.is_none() {
        return Err(DedupError::Config {
            message: "A reverse geocoder (API key) is required unless running a dry run"
                .to_string(),
        });
    }

    let mut report = RunReport {
        dry_run: config.dry_run,
        grid_size: grid.size(),
        ..RunReport::default()
    };

    let Some(placeholder) = store.find_placeholder(&config.placeholder_marker).await? else {
        log::info!(
            "No address matching \"{}\" found; nothing to geocode",
            config.placeholder_marker
        );
        report.nothing_to_do = Some(NothingToDo::NoPlaceholder);
        return Ok(report);
    };
    report.placeholder = Some(placeholder);
    log::info!("Placeholder address ID: {placeholder}");

    let pending = store.pending_records(placeholder).await?;
    let Some(first) = pending.first() else {
        log::info!("No pending records found; everything is already geocoded");
        report.nothing_to_do = Some(NothingToDo::NoPendingRecords);
        return Ok(report);
    };

    let (north_south, east_west) = grid.cell_dimensions_m(first.coordinate.latitude);
    log::info!(
        "Grid size: {}° ≈ {north_south:.0}m lat × {east_west:.0}m lng",
        grid.size()
    );

    for record in &pending {
        *report.pending_by_kind.entry(record.kind).or_default() += 1;
    }
    report.pending_total = pending.len() as u64;

    let clusters = Clusters::build(&pending, &grid);
    let existing = store.existing_locations(placeholder).await?;
    let catalog = LocationCatalog::build(&grid, &existing);
    report.clusters = clusters.len() as u64;
    report.existing_locations = existing.len() as u64;
    log::info!(
        "{} pending record(s) in {} cluster(s); {} existing address(es)",
        report.pending_total,
        report.clusters,
        report.existing_locations
    );

    let mut planner = ResolutionPlanner::new(grid, catalog, geocoder, config.delay);
    let plan = planner.plan(&clusters);
    report.reuse_clusters = plan.reuse.len() as u64;
    report.reuse_records = plan.reuse_records() as u64;
    report.lookup_clusters = plan.lookup.len() as u64;
    report.lookup_records = plan.lookup_records() as u64;

    log::info!("Phase 1: matching existing addresses");
    if config.dry_run {
        log::info!(
            "Would match {} location(s) to existing addresses ({} record(s))",
            report.reuse_clusters,
            report.reuse_records
        );
    } else if !plan.reuse.is_empty() {
        let txn = store.begin().await?;
        let result = apply_reuse(txn.as_ref(), &plan.reuse).await;
        report.reuse_records_updated = settle(txn, result).await?;
        log::info!(
            "Matched {} location(s) to existing addresses, updated {} record(s)",
            report.reuse_clusters,
            report.reuse_records_updated
        );
    }
    log::info!(
        "{} location(s) need geocoding ({} record(s))",
        report.lookup_clusters,
        report.lookup_records
    );

    if config.dry_run {
        log::info!(
            "Phase 2: would make {} API call(s) and update {} record(s)",
            report.lookup_clusters,
            report.lookup_records
        );
    } else {
        log::info!("Phase 2: geocoding new locations");
        let progress = progress.unwrap_or_else(null_progress);
        lookup_phase(
            store,
            &mut planner,
            &plan.lookup,
            config.commit_every,
            progress.as_ref(),
            &mut report,
        )
        .await?;
        log::info!(
            "API calls: {} ({} error(s)), records updated: {}",
            report.lookups_attempted,
            report.lookups_failed,
            report.lookup_records_updated
        );

        log::info!("Phase 3: placeholder cleanup");
        let txn = store.begin().await?;
        let result = delete_if_unreferenced(txn.as_ref(), placeholder).await;
        let (remaining, removed) = settle(txn, result).await?;
        report.placeholder_references_remaining = Some(remaining);
        report.placeholder_removed = removed;
        if removed {
            log::info!("Placeholder address {placeholder} removed");
        } else {
            log::warn!(
                "{remaining} record(s) still reference placeholder {placeholder}; keeping it"
            );
        }
    }

    report.estimated_cost_usd = config.pricing.estimate(report.billable_calls());
    Ok(report)
}

/// Commits `txn` if `result` is `Ok`, rolls it back otherwise.
async fn settle<T>(
    txn: Box<dyn StoreTransaction>,
    result: Result<T, DedupError>,
) -> Result<T, DedupError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                log::warn!("Rollback failed: {rollback_err}");
            }
            Err(e)
        }
    }
}

async fn apply_reuse(
    txn: &dyn StoreTransaction,
    reuse: &[(&Cluster, LocationId)],
) -> Result<u64, DedupError> {
    let mut written = 0u64;
    for (cluster, location) in reuse {
        written += fanout::apply(txn, cluster, *location).await?;
    }
    Ok(written)
}

async fn resolve_and_apply(
    planner: &mut ResolutionPlanner<'_>,
    txn: &dyn StoreTransaction,
    cluster: &Cluster,
) -> Result<(Resolution, u64), DedupError> {
    let resolution = planner.resolve(cluster, txn).await?;
    let written = match resolution.location() {
        Some(location) => fanout::apply(txn, cluster, location).await?,
        None => 0,
    };
    Ok((resolution, written))
}

/// Phase 2. The progress bar is finished on every exit path.
async fn lookup_phase(
    store: &dyn LocationStore,
    planner: &mut ResolutionPlanner<'_>,
    lookups: &[&Cluster],
    commit_every: u64,
    progress: &dyn ProgressCallback,
    report: &mut RunReport,
) -> Result<(), DedupError> {
    progress.set_total(lookups.len() as u64);

    let result = lookup_loop(store, planner, lookups, commit_every, progress, report).await;
    report.lookups_attempted = planner.lookups();

    match &result {
        Ok(()) => progress.finish(format!(
            "Geocoded {} location(s), {} failed",
            report.lookups_attempted - report.lookups_failed,
            report.lookups_failed
        )),
        Err(e) => progress.finish(format!(
            "Stopped after {} lookup(s): {e}",
            report.lookups_attempted
        )),
    }

    result
}

async fn lookup_loop(
    store: &dyn LocationStore,
    planner: &mut ResolutionPlanner<'_>,
    lookups: &[&Cluster],
    commit_every: u64,
    progress: &dyn ProgressCallback,
    report: &mut RunReport,
) -> Result<(), DedupError> {
    let mut txn = store.begin().await?;
    let mut since_commit = 0u64;

    for (i, cluster) in lookups.iter().enumerate() {
        progress.set_message(format!("Geocoding {}", cluster.representative()));

        let step = resolve_and_apply(planner, txn.as_ref(), cluster).await;
        progress.inc(1);

        let (resolution, written) = match step {
            Ok(step) => step,
            Err(e) => return settle(txn, Err(e)).await,
        };

        report.lookup_records_updated += written;
        match resolution {
            Resolution::LookedUp(_) => since_commit += 1,
            Resolution::Failed(_) => report.lookups_failed += 1,
            Resolution::Reused(_) => {}
        }

        if since_commit >= commit_every {
            txn.commit().await?;
            log::info!(
                "Checkpoint: {} of {} location(s) processed",
                i + 1,
                lookups.len()
            );
            since_commit = 0;
            txn = store.begin().await?;
        }
    }

    txn.commit().await?;
    Ok(())
}

/// Returns the remaining reference count and whether the placeholder was
/// deleted.
async fn delete_if_unreferenced(
    txn: &dyn StoreTransaction,
    placeholder: LocationId,
) -> Result<(u64, bool), DedupError> {
    let remaining = txn.count_references(placeholder).await?;
    if remaining > 0 {
        return Ok((remaining, false));
    }
    txn.delete_location(placeholder).await?;
    Ok((0, true))
}
