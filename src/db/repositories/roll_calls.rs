use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{connection::Database, helpers::parse_datetime},
    models::{NewRollCall, PersistedRollCall},
};

use super::roster::{ensure_class, row_to_student};

const RECORD_COLUMNS: &str = "r.id AS record_id, r.student_id AS record_student_id,
        r.class_id AS record_class_id, r.group_id AS record_group_id,
        r.called_at AS record_called_at,
        s.id AS id, s.student_id AS student_id, s.name AS name, s.weight AS weight,
        s.group_id AS group_id, s.created_at AS created_at";

fn row_to_roll_call(row: &Row) -> Result<PersistedRollCall> {
    let called_at: String = row.get("record_called_at")?;

    Ok(PersistedRollCall {
        id: row.get("record_id")?,
        student_id: row.get("record_student_id")?,
        class_id: row.get("record_class_id")?,
        group_id: Some(row.get("record_group_id")?),
        called_at: parse_datetime(&called_at, "called_at")?,
        student: Some(row_to_student(row)?),
    })
}

impl Database {
    /// Stores a committed selection. The group is taken from the student's
    /// current membership.
    pub async fn insert_roll_call(&self, record: NewRollCall) -> Result<PersistedRollCall> {
        self.transaction(move |tx| {
            let group_id: Option<i64> = tx
                .query_row(
                    "SELECT group_id FROM students WHERE id = ?1",
                    params![record.student_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(group_id) = group_id else {
                bail!("student not found");
            };
            ensure_class(tx, record.class_id)?;

            tx.execute(
                "INSERT INTO roll_call_records (student_id, group_id, class_id, called_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.student_id,
                    group_id,
                    record.class_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let record_id = tx.last_insert_rowid();

            let query = format!(
                "SELECT {RECORD_COLUMNS}
                 FROM roll_call_records r
                 JOIN students s ON s.id = r.student_id
                 WHERE r.id = ?1"
            );
            let mut stmt = tx.prepare(&query)?;
            let mut rows = stmt.query(params![record_id])?;
            match rows.next()? {
                Some(row) => row_to_roll_call(row),
                None => bail!("roll call record not found after insert"),
            }
        })
        .await
    }

    pub async fn list_roll_calls(&self) -> Result<Vec<PersistedRollCall>> {
        self.execute(|conn| {
            let query = format!(
                "SELECT {RECORD_COLUMNS}
                 FROM roll_call_records r
                 JOIN students s ON s.id = r.student_id
                 ORDER BY r.id ASC"
            );
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_roll_call(row)?);
            }
            Ok(records)
        })
        .await
    }
}
