//! In-memory store and scripted provider for engine tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geofill_database::{DbError, LocationStore, StoreTransaction};
use geofill_geocoder::{GeocodeError, ReverseGeocodedAddress, ReverseGeocoder};
use geofill_location_models::{
    AddressComponents, Coordinate, ExistingLocation, LocationId, NewLocation, PendingRecord,
    RecordKind,
};

use crate::progress::ProgressCallback;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAddress {
    pub display_name: String,
    pub coordinate: Option<Coordinate>,
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    addresses: BTreeMap<LocationId, StoredAddress>,
    references: BTreeMap<(RecordKind, i64), (Coordinate, LocationId)>,
}

impl Tables {
    fn apply(&mut self, op: &Op) {
        match op {
            Op::Insert(id, address) => {
                self.addresses.insert(*id, address.clone());
            }
            Op::Assign(kind, record_id, location) => {
                if let Some(entry) = self.references.get_mut(&(*kind, *record_id)) {
                    entry.1 = *location;
                }
            }
            Op::Delete(id) => {
                self.addresses.remove(id);
            }
        }
    }

    fn references_to(&self, location: LocationId) -> u64 {
        self.references
            .values()
            .filter(|(_, l)| *l == location)
            .count() as u64
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    next_id: i64,
    begun: u64,
    commits: u64,
    rollbacks: u64,
    inserts: u64,
    fail_inserts_after: Option<u64>,
}

#[derive(Debug, Clone)]
enum Op {
    Insert(LocationId, StoredAddress),
    Assign(RecordKind, i64, LocationId),
    Delete(LocationId),
}

/// Store whose transactions buffer writes until commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().next_id = 1;
        store
    }

    pub fn add_placeholder(&self) -> LocationId {
        self.add_address("Pending Geocode (placeholder)", None)
    }

    pub fn add_address(&self, display_name: &str, coordinate: Option<Coordinate>) -> LocationId {
        let mut state = self.state.lock().unwrap();
        let id = LocationId(state.next_id);
        state.next_id += 1;
        state.tables.addresses.insert(
            id,
            StoredAddress {
                display_name: display_name.to_string(),
                coordinate,
                raw: None,
            },
        );
        id
    }

    pub fn add_record(
        &self,
        kind: RecordKind,
        id: i64,
        coordinate: Coordinate,
        location: LocationId,
    ) -> PendingRecord {
        self.state
            .lock()
            .unwrap()
            .tables
            .references
            .insert((kind, id), (coordinate, location));
        PendingRecord {
            id,
            kind,
            coordinate,
        }
    }

    /// Makes every insert after the first `n` fail.
    pub fn fail_inserts_after(&self, n: u64) {
        self.state.lock().unwrap().fail_inserts_after = Some(n);
    }

    pub fn reference(&self, kind: RecordKind, id: i64) -> Option<LocationId> {
        self.state
            .lock()
            .unwrap()
            .tables
            .references
            .get(&(kind, id))
            .map(|(_, l)| *l)
    }

    pub fn references_to(&self, location: LocationId) -> u64 {
        self.state.lock().unwrap().tables.references_to(location)
    }

    pub fn address(&self, id: LocationId) -> Option<StoredAddress> {
        self.state.lock().unwrap().tables.addresses.get(&id).cloned()
    }

    pub fn address_count(&self) -> usize {
        self.state.lock().unwrap().tables.addresses.len()
    }

    pub fn transactions_begun(&self) -> u64 {
        self.state.lock().unwrap().begun
    }

    pub fn commits(&self) -> u64 {
        self.state.lock().unwrap().commits
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn find_placeholder(&self, marker: &str) -> Result<Option<LocationId>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .addresses
            .iter()
            .find(|(_, a)| a.display_name.contains(marker))
            .map(|(id, _)| *id))
    }

    async fn pending_records(
        &self,
        placeholder: LocationId,
    ) -> Result<Vec<PendingRecord>, DbError> {
        let state = self.state.lock().unwrap();
        let mut records = Vec::new();
        for kind in RecordKind::ALL {
            records.extend(
                state
                    .tables
                    .references
                    .iter()
                    .filter(|((k, _), (_, l))| *k == kind && *l == placeholder)
                    .map(|((k, id), (coordinate, _))| PendingRecord {
                        id: *id,
                        kind: *k,
                        coordinate: *coordinate,
                    }),
            );
        }
        Ok(records)
    }

    async fn existing_locations(
        &self,
        placeholder: LocationId,
    ) -> Result<Vec<ExistingLocation>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .addresses
            .iter()
            .filter(|(id, _)| **id != placeholder)
            .filter_map(|(id, a)| {
                a.coordinate.map(|coordinate| ExistingLocation {
                    id: *id,
                    coordinate,
                })
            })
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DbError> {
        self.state.lock().unwrap().begun += 1;
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            ops: Mutex::new(Vec::new()),
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    ops: Mutex<Vec<Op>>,
}

impl MemoryTransaction {
    fn view(&self) -> Tables {
        let mut tables = self.state.lock().unwrap().tables.clone();
        for op in self.ops.lock().unwrap().iter() {
            tables.apply(op);
        }
        tables
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_location(&self, location: &NewLocation) -> Result<LocationId, DbError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            if state
                .fail_inserts_after
                .is_some_and(|limit| state.inserts >= limit)
            {
                return Err(DbError::Conversion {
                    message: "injected insert failure".to_string(),
                });
            }
            state.inserts += 1;
            let id = LocationId(state.next_id);
            state.next_id += 1;
            id
        };

        self.ops.lock().unwrap().push(Op::Insert(
            id,
            StoredAddress {
                display_name: location.display_name.clone(),
                coordinate: Some(location.coordinate),
                raw: Some(location.raw.clone()),
            },
        ));
        Ok(id)
    }

    async fn assign_location(
        &self,
        kind: RecordKind,
        record_id: i64,
        location: LocationId,
    ) -> Result<u64, DbError> {
        let exists = self.view().references.contains_key(&(kind, record_id));
        self.ops
            .lock()
            .unwrap()
            .push(Op::Assign(kind, record_id, location));
        Ok(u64::from(exists))
    }

    async fn count_references(&self, location: LocationId) -> Result<u64, DbError> {
        Ok(self.view().references_to(location))
    }

    async fn delete_location(&self, location: LocationId) -> Result<u64, DbError> {
        let exists = self.view().addresses.contains_key(&location);
        self.ops.lock().unwrap().push(Op::Delete(location));
        Ok(u64::from(exists))
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let ops = std::mem::take(&mut *self.ops.lock().unwrap());
        let mut state = self.state.lock().unwrap();
        for op in &ops {
            state.tables.apply(op);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

type FailPredicate = Box<dyn Fn(Coordinate) -> bool + Send + Sync>;

/// Provider that records every call and answers from the coordinate.
pub struct ScriptedGeocoder {
    calls: Mutex<Vec<Coordinate>>,
    fail_if: FailPredicate,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::failing_when(|_| false)
    }

    pub fn failing_when(fail_if: impl Fn(Coordinate) -> bool + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_if: Box::new(fail_if),
        }
    }

    pub fn calls(&self) -> Vec<Coordinate> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReverseGeocoder for ScriptedGeocoder {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> Result<ReverseGeocodedAddress, GeocodeError> {
        self.calls.lock().unwrap().push(coordinate);

        if (self.fail_if)(coordinate) {
            return Err(GeocodeError::NoResults);
        }

        let display_name = format!(
            "Resolved {:.4}, {:.4}",
            coordinate.latitude, coordinate.longitude
        );
        Ok(ReverseGeocodedAddress {
            raw: serde_json::json!({ "formatted_address": display_name }),
            display_name,
            components: AddressComponents {
                city: Some("Testville".to_string()),
                ..AddressComponents::default()
            },
        })
    }
}

/// Progress sink that remembers what it was told.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    total: Mutex<Option<u64>>,
    position: Mutex<u64>,
    finished: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn total(&self) -> Option<u64> {
        *self.total.lock().unwrap()
    }

    pub fn position(&self) -> u64 {
        *self.position.lock().unwrap()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn set_total(&self, total: u64) {
        *self.total.lock().unwrap() = Some(total);
    }

    fn inc(&self, delta: u64) {
        *self.position.lock().unwrap() += delta;
    }

    fn set_message(&self, _msg: String) {}

    fn finish(&self, msg: String) {
        self.finished.lock().unwrap().push(msg);
    }
}
