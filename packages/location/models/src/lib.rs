#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Coordinate, pending record, and address types for the geofill
//! toolchain.
//!
//! These types describe the telemetry records that still point at the
//! placeholder address and the resolved addresses that replace it. They are
//! shared by the store layer (`geofill_database`), the reverse-geocoding
//! client (`geofill_geocoder`), and the deduplication engine
//! (`geofill_dedup`).

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Primary key of a row in the `addresses` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocationId(pub i64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which address reference of a telemetry record is pending.
///
/// Each kind maps to exactly one foreign-key column in the store:
/// drive start, drive end, and charging session address.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RecordKind {
    /// Start address of a drive (`drives.start_address_id`).
    Origin,
    /// End address of a drive (`drives.end_address_id`).
    Destination,
    /// Address of a charging session (`charging_processes.address_id`).
    EventLocation,
}

impl RecordKind {
    /// All record kinds in the order the store enumerates them.
    pub const ALL: [Self; 3] = [Self::Origin, Self::Destination, Self::EventLocation];

    /// Human-readable label used in run reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Origin => "Drive starts",
            Self::Destination => "Drive ends",
            Self::EventLocation => "Charging",
        }
    }
}

/// A record whose address reference still points at the placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    /// Primary key of the owning row (`drives.id` or
    /// `charging_processes.id`).
    pub id: i64,
    /// Which address column is pending.
    pub kind: RecordKind,
    /// Raw position the record was captured at.
    pub coordinate: Coordinate,
}

/// A previously resolved address that carries a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExistingLocation {
    /// Primary key.
    pub id: LocationId,
    /// Stored coordinate.
    pub coordinate: Coordinate,
}

/// Structured address parts extracted from a provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponents {
    /// Point of interest, premise, or road name.
    pub name: Option<String>,
    pub house_number: Option<String>,
    pub road: Option<String>,
    pub neighbourhood: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub postcode: Option<String>,
    pub state: Option<String>,
    pub state_district: Option<String>,
    pub country: Option<String>,
}

/// An address about to be inserted into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    /// Formatted, single-line address.
    pub display_name: String,
    /// Grid-snapped coordinate of the cluster this address resolves.
    pub coordinate: Coordinate,
    /// Structured address parts.
    pub components: AddressComponents,
    /// Unmodified provider payload, kept for auditing.
    pub raw: serde_json::Value,
}
