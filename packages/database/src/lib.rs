#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Access to the TeslaMate address tables.
//!
//! The deduplication engine talks to the store through the
//! [`LocationStore`] and [`StoreTransaction`] traits. [`PostgresStore`]
//! implements them on top of `switchy_database`, using raw parameterized
//! SQL via `query_raw_params()` / `exec_raw_params()`.

pub mod db;
pub mod queries;

use async_trait::async_trait;
use geofill_location_models::{
    ExistingLocation, LocationId, NewLocation, PendingRecord, RecordKind,
};
use switchy_database::{Database, DatabaseTransaction};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Connection could not be established.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of what went wrong.
        message: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Point-in-time reads plus the entry point for transactional writes.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Finds the placeholder address whose display name contains `marker`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn find_placeholder(&self, marker: &str) -> Result<Option<LocationId>, DbError>;

    /// Returns every record whose address still points at `placeholder`,
    /// grouped by kind in [`RecordKind::ALL`] order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a query fails or a row cannot be converted.
    async fn pending_records(&self, placeholder: LocationId)
    -> Result<Vec<PendingRecord>, DbError>;

    /// Returns all non-placeholder addresses that carry a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be converted.
    async fn existing_locations(
        &self,
        placeholder: LocationId,
    ) -> Result<Vec<ExistingLocation>, DbError>;

    /// Opens a transaction. Nothing written through it is visible to other
    /// readers until [`StoreTransaction::commit`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the transaction cannot be started.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DbError>;
}

/// Writes scoped to a single database transaction.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Inserts a resolved address and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the insert fails.
    async fn insert_location(&self, location: &NewLocation) -> Result<LocationId, DbError>;

    /// Points one record's address column at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    async fn assign_location(
        &self,
        kind: RecordKind,
        record_id: i64,
        location: LocationId,
    ) -> Result<u64, DbError>;

    /// Counts references to `location` across every record kind.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    async fn count_references(&self, location: LocationId) -> Result<u64, DbError>;

    /// Deletes an address row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    async fn delete_location(&self, location: LocationId) -> Result<u64, DbError>;

    /// Makes every write in this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    /// Discards every write in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// [`LocationStore`] backed by a TeslaMate Postgres database.
pub struct PostgresStore {
    db: Box<dyn Database>,
}

impl PostgresStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocationStore for PostgresStore {
    async fn find_placeholder(&self, marker: &str) -> Result<Option<LocationId>, DbError> {
        queries::find_placeholder(self.db.as_ref(), marker).await
    }

    async fn pending_records(
        &self,
        placeholder: LocationId,
    ) -> Result<Vec<PendingRecord>, DbError> {
        let mut records = Vec::new();
        for kind in RecordKind::ALL {
            let batch = queries::pending_records(self.db.as_ref(), kind, placeholder).await?;
            log::debug!("{} pending {kind} record(s)", batch.len());
            records.extend(batch);
        }
        Ok(records)
    }

    async fn existing_locations(
        &self,
        placeholder: LocationId,
    ) -> Result<Vec<ExistingLocation>, DbError> {
        queries::existing_locations(self.db.as_ref(), placeholder).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DbError> {
        let txn = self.db.begin_transaction().await?;
        Ok(Box::new(PostgresTransaction { txn }))
    }
}

struct PostgresTransaction {
    txn: Box<dyn DatabaseTransaction>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_location(&self, location: &NewLocation) -> Result<LocationId, DbError> {
        queries::insert_location(self.txn.as_ref(), location).await
    }

    async fn assign_location(
        &self,
        kind: RecordKind,
        record_id: i64,
        location: LocationId,
    ) -> Result<u64, DbError> {
        queries::assign_location(self.txn.as_ref(), kind, record_id, location).await
    }

    async fn count_references(&self, location: LocationId) -> Result<u64, DbError> {
        queries::count_references(self.txn.as_ref(), location).await
    }

    async fn delete_location(&self, location: LocationId) -> Result<u64, DbError> {
        queries::delete_location(self.txn.as_ref(), location).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.txn.rollback().await?;
        Ok(())
    }
}
