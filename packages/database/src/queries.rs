//! SQL for the TeslaMate `addresses`, `drives`, `charging_processes`, and
//! `positions` tables.
//!
//! Ids are bound as `bigint` and read back as `bigint` so the same code
//! works whether the schema uses `integer` or `bigint` keys. Coordinates
//! are stored as `numeric` and cast to `float8` on the way in and out.

use geofill_location_models::{
    Coordinate, ExistingLocation, LocationId, NewLocation, PendingRecord, RecordKind,
};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;

/// Selects pending records of one kind, joined to their position.
const fn pending_query(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Origin => {
            "SELECT d.id::bigint AS id,
                    p.latitude::float8 AS latitude,
                    p.longitude::float8 AS longitude
             FROM drives d
             JOIN positions p ON d.start_position_id = p.id
             WHERE d.start_address_id = $1::bigint
             ORDER BY d.id"
        }
        RecordKind::Destination => {
            "SELECT d.id::bigint AS id,
                    p.latitude::float8 AS latitude,
                    p.longitude::float8 AS longitude
             FROM drives d
             JOIN positions p ON d.end_position_id = p.id
             WHERE d.end_address_id = $1::bigint
             ORDER BY d.id"
        }
        RecordKind::EventLocation => {
            "SELECT c.id::bigint AS id,
                    p.latitude::float8 AS latitude,
                    p.longitude::float8 AS longitude
             FROM charging_processes c
             JOIN positions p ON c.position_id = p.id
             WHERE c.address_id = $1::bigint
             ORDER BY c.id"
        }
    }
}

/// Points one record's address column at a location.
const fn assign_query(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Origin => "UPDATE drives SET start_address_id = $1::bigint WHERE id = $2::bigint",
        RecordKind::Destination => {
            "UPDATE drives SET end_address_id = $1::bigint WHERE id = $2::bigint"
        }
        RecordKind::EventLocation => {
            "UPDATE charging_processes SET address_id = $1::bigint WHERE id = $2::bigint"
        }
    }
}

fn parse_id(row: &Row, what: &str) -> Result<i64, DbError> {
    row.to_value("id").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse {what} id: {e}"),
    })
}

fn parse_coordinate(row: &Row, what: &str) -> Result<Option<Coordinate>, DbError> {
    let latitude: Option<f64> = row.to_value("latitude").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse {what} latitude: {e}"),
    })?;
    let longitude: Option<f64> = row.to_value("longitude").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse {what} longitude: {e}"),
    })?;

    Ok(latitude
        .zip(longitude)
        .map(|(latitude, longitude)| Coordinate::new(latitude, longitude)))
}

fn opt_string(value: Option<&String>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.clone()))
}

/// Finds the placeholder address by a substring of its display name.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn find_placeholder(
    db: &dyn Database,
    marker: &str,
) -> Result<Option<LocationId>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id::bigint AS id FROM addresses
             WHERE display_name LIKE '%' || $1 || '%'
             ORDER BY id
             LIMIT 1",
            &[DatabaseValue::String(marker.to_string())],
        )
        .await?;

    rows.first()
        .map(|row| parse_id(row, "placeholder").map(LocationId))
        .transpose()
}

/// Returns records of one kind whose address is `placeholder`.
///
/// Records whose position has no coordinate are skipped with a warning;
/// they cannot be clustered.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn pending_records(
    db: &dyn Database,
    kind: RecordKind,
    placeholder: LocationId,
) -> Result<Vec<PendingRecord>, DbError> {
    let rows = db
        .query_raw_params(pending_query(kind), &[DatabaseValue::Int64(placeholder.0)])
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let id = parse_id(row, kind.as_ref())?;
        let Some(coordinate) = parse_coordinate(row, kind.as_ref())? else {
            log::warn!("Skipping {kind} record {id}: position has no coordinate");
            continue;
        };
        records.push(PendingRecord {
            id,
            kind,
            coordinate,
        });
    }

    Ok(records)
}

/// Returns all non-placeholder addresses with a coordinate, by ascending id.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn existing_locations(
    db: &dyn Database,
    placeholder: LocationId,
) -> Result<Vec<ExistingLocation>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT id::bigint AS id,
                    latitude::float8 AS latitude,
                    longitude::float8 AS longitude
             FROM addresses
             WHERE id != $1::bigint
               AND latitude IS NOT NULL
               AND longitude IS NOT NULL
             ORDER BY id",
            &[DatabaseValue::Int64(placeholder.0)],
        )
        .await?;

    let mut locations = Vec::with_capacity(rows.len());
    for row in &rows {
        let id = LocationId(parse_id(row, "address")?);
        let coordinate = parse_coordinate(row, "address")?.ok_or_else(|| DbError::Conversion {
            message: format!("Address {id} has a null coordinate"),
        })?;
        locations.push(ExistingLocation { id, coordinate });
    }

    Ok(locations)
}

/// Inserts a resolved address and returns its id.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn insert_location(
    db: &dyn Database,
    location: &NewLocation,
) -> Result<LocationId, DbError> {
    let c = &location.components;
    let rows = db
        .query_raw_params(
            "INSERT INTO addresses (
                display_name, latitude, longitude, name, house_number, road,
                neighbourhood, city, county, postcode, state, state_district,
                country, raw, inserted_at, updated_at, osm_id, osm_type
            ) VALUES (
                $1, $2::float8, $3::float8, $4, $5, $6,
                $7, $8, $9, $10, $11, $12,
                $13, $14::text::jsonb, NOW(), NOW(), NULL, NULL
            )
            RETURNING id::bigint AS id",
            &[
                DatabaseValue::String(location.display_name.clone()),
                DatabaseValue::Real64(location.coordinate.latitude),
                DatabaseValue::Real64(location.coordinate.longitude),
                opt_string(c.name.as_ref()),
                opt_string(c.house_number.as_ref()),
                opt_string(c.road.as_ref()),
                opt_string(c.neighbourhood.as_ref()),
                opt_string(c.city.as_ref()),
                opt_string(c.county.as_ref()),
                opt_string(c.postcode.as_ref()),
                opt_string(c.state.as_ref()),
                opt_string(c.state_district.as_ref()),
                opt_string(c.country.as_ref()),
                DatabaseValue::String(location.raw.to_string()),
            ],
        )
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "Failed to get address id from insert".to_string(),
    })?;

    Ok(LocationId(parse_id(row, "address")?))
}

/// Points one record's address column at `location`.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn assign_location(
    db: &dyn Database,
    kind: RecordKind,
    record_id: i64,
    location: LocationId,
) -> Result<u64, DbError> {
    let updated = db
        .exec_raw_params(
            assign_query(kind),
            &[
                DatabaseValue::Int64(location.0),
                DatabaseValue::Int64(record_id),
            ],
        )
        .await?;

    Ok(updated)
}

/// Counts references to an address across all record kinds.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn count_references(db: &dyn Database, location: LocationId) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT COUNT(*)::bigint AS cnt FROM (
                SELECT 1 FROM drives WHERE start_address_id = $1::bigint
                UNION ALL SELECT 1 FROM drives WHERE end_address_id = $1::bigint
                UNION ALL SELECT 1 FROM charging_processes WHERE address_id = $1::bigint
            ) refs",
            &[DatabaseValue::Int64(location.0)],
        )
        .await?;

    let Some(row) = rows.first() else {
        return Ok(0);
    };

    let count: i64 = row.to_value("cnt").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse reference count: {e}"),
    })?;

    u64::try_from(count).map_err(|e| DbError::Conversion {
        message: format!("Negative reference count {count}: {e}"),
    })
}

/// Deletes an address row.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn delete_location(db: &dyn Database, location: LocationId) -> Result<u64, DbError> {
    let deleted = db
        .exec_raw_params(
            "DELETE FROM addresses WHERE id = $1::bigint",
            &[DatabaseValue::Int64(location.0)],
        )
        .await?;

    Ok(deleted)
}
