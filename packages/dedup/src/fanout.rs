//! Writes a resolved address onto every record of a cluster.

use geofill_database::{DbError, StoreTransaction};
use geofill_location_models::LocationId;

use crate::cluster::Cluster;

/// Points every record in `cluster` at `location`.
///
/// Repeating the call with the same location leaves the same references.
/// Returns the number of records actually updated; records deleted since
/// they were read are skipped.
///
/// # Errors
///
/// Returns [`DbError`] if any update fails. Earlier updates of the same
/// call stay in the transaction; the caller decides whether to roll back.
pub async fn apply(
    txn: &dyn StoreTransaction,
    cluster: &Cluster,
    location: LocationId,
) -> Result<u64, DbError> {
    let mut written = 0u64;

    for record in cluster.records() {
        let affected = txn.assign_location(record.kind, record.id, location).await?;
        if affected == 0 {
            log::debug!(
                "{} record {} no longer exists, nothing to update",
                record.kind,
                record.id
            );
            continue;
        }
        log::trace!("{} record {} -> address {location}", record.kind, record.id);
        written += affected;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use geofill_database::LocationStore as _;
    use geofill_location_models::{Coordinate, PendingRecord, RecordKind};

    use super::*;
    use crate::cluster::Clusters;
    use crate::grid::GridIndex;
    use crate::test_support::MemoryStore;

    #[tokio::test]
    async fn points_every_record_at_the_location() {
        let store = MemoryStore::new();
        let placeholder = store.add_placeholder();
        let target = store.add_address("1 Main St", Some(Coordinate::new(42.0, -71.0)));
        let records = [
            store.add_record(RecordKind::Origin, 1, Coordinate::new(42.0001, -71.0001), placeholder),
            store.add_record(RecordKind::Destination, 1, Coordinate::new(42.0002, -71.0002), placeholder),
            store.add_record(RecordKind::EventLocation, 5, Coordinate::new(42.0001, -71.0002), placeholder),
        ];
        let clusters = Clusters::build(&records, &GridIndex::default());
        let cluster = clusters.iter().next().unwrap();

        let txn = store.begin().await.unwrap();
        assert_eq!(apply(txn.as_ref(), cluster, target).await.unwrap(), 3);
        txn.commit().await.unwrap();

        for record in &records {
            assert_eq!(store.reference(record.kind, record.id), Some(target));
        }
        assert_eq!(store.references_to(placeholder), 0);
    }

    #[tokio::test]
    async fn repeated_application_is_idempotent() {
        let store = MemoryStore::new();
        let placeholder = store.add_placeholder();
        let target = store.add_address("1 Main St", Some(Coordinate::new(42.0, -71.0)));
        let records = [store.add_record(
            RecordKind::Origin,
            1,
            Coordinate::new(42.0001, -71.0001),
            placeholder,
        )];
        let clusters = Clusters::build(&records, &GridIndex::default());
        let cluster = clusters.iter().next().unwrap();

        for _ in 0..2 {
            let txn = store.begin().await.unwrap();
            apply(txn.as_ref(), cluster, target).await.unwrap();
            txn.commit().await.unwrap();
            assert_eq!(store.reference(RecordKind::Origin, 1), Some(target));
        }
    }

    #[tokio::test]
    async fn vanished_records_are_not_counted() {
        let store = MemoryStore::new();
        let placeholder = store.add_placeholder();
        let target = store.add_address("1 Main St", Some(Coordinate::new(42.0, -71.0)));
        let kept = store.add_record(
            RecordKind::Origin,
            1,
            Coordinate::new(42.0001, -71.0001),
            placeholder,
        );
        let deleted = PendingRecord {
            id: 2,
            kind: RecordKind::Origin,
            coordinate: Coordinate::new(42.0002, -71.0002),
        };
        let clusters = Clusters::build(&[kept, deleted], &GridIndex::default());
        let cluster = clusters.iter().next().unwrap();
        assert_eq!(cluster.len(), 2);

        let txn = store.begin().await.unwrap();
        assert_eq!(apply(txn.as_ref(), cluster, target).await.unwrap(), 1);
        txn.commit().await.unwrap();

        assert_eq!(store.reference(RecordKind::Origin, 1), Some(target));
        assert_eq!(store.reference(RecordKind::Origin, 2), None);
    }
}
