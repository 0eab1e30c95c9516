//! Query helpers. Each takes a borrowed connection so it can run inside
//! `AsyncDatabase::call`.

use crate::models::DATETIME_FORMAT;
use crate::{DatabaseError, DatabaseResult, MachineStatusRecord, RawAcknowledgment, RecordTable};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(raw: &str) -> DatabaseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::InvalidData(format!("bad updated_on {raw:?}: {e}")))
}

/// Row shape before the timestamp is parsed; rusqlite's row closure can only
/// fail with rusqlite errors.
struct RecordRow {
    id: String,
    machine_id: i64,
    machine_status: bool,
    shot_count: i64,
    shot_status: i64,
    status: String,
    updated_on: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            machine_id: row.get(1)?,
            machine_status: row.get(2)?,
            shot_count: row.get(3)?,
            shot_status: row.get(4)?,
            status: row.get(5)?,
            updated_on: row.get(6)?,
        })
    }

    fn into_record(self) -> DatabaseResult<MachineStatusRecord> {
        Ok(MachineStatusRecord {
            updated_on: parse_datetime(&self.updated_on)?,
            id: self.id,
            machine_id: self.machine_id,
            machine_status: self.machine_status,
            shot_count: self.shot_count,
            shot_status: self.shot_status,
            status: self.status,
        })
    }
}

const RECORD_COLUMNS: &str =
    "id, machine_id, machine_status, shot_count, shot_status, status, updated_on";

/// Insert a record or overwrite every field of the row with the same id.
pub fn upsert_record(
    conn: &Connection,
    table: RecordTable,
    record: &MachineStatusRecord,
) -> DatabaseResult<()> {
    let sql = format!(
        "INSERT INTO {table} ({RECORD_COLUMNS}, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            machine_id = excluded.machine_id,
            machine_status = excluded.machine_status,
            shot_count = excluded.shot_count,
            shot_status = excluded.shot_status,
            status = excluded.status,
            updated_on = excluded.updated_on,
            stored_at = excluded.stored_at",
        table = table.name()
    );
    conn.execute(
        &sql,
        params![
            record.id,
            record.machine_id,
            record.machine_status,
            record.shot_count,
            record.shot_status,
            record.status,
            format_datetime(&record.updated_on),
        ],
    )?;
    Ok(())
}

/// Get a record by id.
pub fn get_record(
    conn: &Connection,
    table: RecordTable,
    id: &str,
) -> DatabaseResult<Option<MachineStatusRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM {table} WHERE id = ?1",
        table = table.name()
    );
    conn.query_row(&sql, params![id], RecordRow::from_row)
        .optional()?
        .map(RecordRow::into_record)
        .transpose()
}

/// List every record in the table, oldest `updated_on` first.
pub fn list_records(conn: &Connection, table: RecordTable) -> DatabaseResult<Vec<MachineStatusRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM {table} ORDER BY updated_on ASC, id ASC",
        table = table.name()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(RecordRow::into_record).collect()
}

/// Delete a record by id. Returns whether a row was removed.
pub fn delete_record(conn: &Connection, table: RecordTable, id: &str) -> DatabaseResult<bool> {
    let sql = format!("DELETE FROM {table} WHERE id = ?1", table = table.name());
    let count = conn.execute(&sql, params![id])?;
    Ok(count > 0)
}

/// Count rows in a record table.
pub fn count_records(conn: &Connection, table: RecordTable) -> DatabaseResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}", table = table.name());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Log the raw payload of an acknowledgment, replacing any earlier one for
/// the same id.
pub fn upsert_raw_acknowledgment(
    conn: &Connection,
    id: &str,
    message: &serde_json::Value,
) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO raw_acknowledgments (id, message, received_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            message = excluded.message,
            received_at = excluded.received_at",
        params![id, serde_json::to_string(message)?],
    )?;
    Ok(())
}

/// Get the logged acknowledgment for an id.
pub fn get_raw_acknowledgment(
    conn: &Connection,
    id: &str,
) -> DatabaseResult<Option<RawAcknowledgment>> {
    let row = conn
        .query_row(
            "SELECT id, message, received_at FROM raw_acknowledgments WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, message, received_at)) => Ok(Some(RawAcknowledgment {
            id,
            message: serde_json::from_str(&message)?,
            received_at,
        })),
        None => Ok(None),
    }
}
