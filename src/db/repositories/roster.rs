use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::{
    db::{connection::Database, helpers::parse_optional_datetime},
    models::{coerce_weight, Class, Group, Student},
};

/// Counts of rows created by a roster import.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub classes: usize,
    pub groups: usize,
    pub students: usize,
}

pub(crate) fn row_to_student(row: &Row) -> Result<Student> {
    let weight: f64 = row.get("weight")?;
    let created_at: Option<String> = row.get("created_at")?;

    Ok(Student {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        name: row.get("name")?,
        weight: coerce_weight(weight),
        group_id: Some(row.get("group_id")?),
        created_at: parse_optional_datetime(created_at, "students.created_at")?,
    })
}

fn row_to_group(row: &Row) -> Result<Group> {
    let created_at: Option<String> = row.get("created_at")?;

    Ok(Group {
        id: row.get("id")?,
        name: row.get("name")?,
        class_id: Some(row.get("class_id")?),
        created_at: parse_optional_datetime(created_at, "groups.created_at")?,
        students: Vec::new(),
    })
}

fn load_groups(conn: &Connection, class_id: Option<i64>) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_id, created_at
         FROM groups
         WHERE ?1 IS NULL OR class_id = ?1
         ORDER BY id ASC",
    )?;
    let mut rows = stmt.query(params![class_id])?;
    let mut groups = Vec::new();
    while let Some(row) = rows.next()? {
        groups.push(row_to_group(row)?);
    }

    let mut stmt = conn.prepare(
        "SELECT s.id AS id, s.student_id AS student_id, s.name AS name, s.weight AS weight,
                s.group_id AS group_id, s.created_at AS created_at
         FROM students s
         JOIN groups g ON g.id = s.group_id
         WHERE ?1 IS NULL OR g.class_id = ?1
         ORDER BY s.id ASC",
    )?;
    let mut rows = stmt.query(params![class_id])?;
    let mut by_group: HashMap<i64, Vec<Student>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let student = row_to_student(row)?;
        if let Some(group_id) = student.group_id {
            by_group.entry(group_id).or_default().push(student);
        }
    }

    for group in &mut groups {
        group.students = by_group.remove(&group.id).unwrap_or_default();
    }
    Ok(groups)
}

fn class_exists(conn: &Connection, class_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM classes WHERE id = ?1",
            params![class_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Database {
    /// Inserts a roster tree. Incoming ids are ignored; rows get fresh ids.
    pub async fn import_roster(&self, classes: Vec<Class>) -> Result<ImportSummary> {
        self.transaction(move |tx| {
            let now = Utc::now().to_rfc3339();
            let mut summary = ImportSummary::default();

            for class in &classes {
                tx.execute(
                    "INSERT INTO classes (name, created_at) VALUES (?1, ?2)",
                    params![class.name, now],
                )?;
                let class_id = tx.last_insert_rowid();
                summary.classes += 1;

                for group in &class.groups {
                    tx.execute(
                        "INSERT INTO groups (name, class_id, created_at) VALUES (?1, ?2, ?3)",
                        params![group.name, class_id, now],
                    )?;
                    let group_id = tx.last_insert_rowid();
                    summary.groups += 1;

                    for student in &group.students {
                        tx.execute(
                            "INSERT INTO students (student_id, name, weight, group_id, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![
                                student.student_id,
                                student.name,
                                f64::from(student.weight),
                                group_id,
                                now,
                            ],
                        )?;
                        summary.students += 1;
                    }
                }
            }

            Ok(summary)
        })
        .await
    }

    /// Every class with nested groups and students.
    pub async fn get_classes(&self) -> Result<Vec<Class>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM classes ORDER BY id ASC")?;
            let mut rows = stmt.query([])?;
            let mut classes = Vec::new();
            while let Some(row) = rows.next()? {
                let created_at: Option<String> = row.get("created_at")?;
                classes.push(Class {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    owner_id: None,
                    created_at: parse_optional_datetime(created_at, "classes.created_at")?,
                    groups: Vec::new(),
                });
            }

            let mut groups = load_groups(conn, None)?;
            for class in &mut classes {
                let (own, rest): (Vec<Group>, Vec<Group>) = groups
                    .into_iter()
                    .partition(|group| group.class_id == Some(class.id));
                class.groups = own;
                groups = rest;
            }
            Ok(classes)
        })
        .await
    }

    pub async fn get_groups(&self, class_id: i64) -> Result<Vec<Group>> {
        self.execute(move |conn| {
            if !class_exists(conn, class_id)? {
                bail!("class not found");
            }
            load_groups(conn, Some(class_id))
        })
        .await
    }

    pub async fn get_students(&self, group_id: i64) -> Result<Vec<Student>> {
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM groups WHERE id = ?1",
                    params![group_id],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                bail!("group not found");
            }

            let mut stmt = conn.prepare(
                "SELECT id, student_id, name, weight, group_id, created_at
                 FROM students
                 WHERE group_id = ?1
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![group_id])?;
            let mut students = Vec::new();
            while let Some(row) = rows.next()? {
                students.push(row_to_student(row)?);
            }
            Ok(students)
        })
        .await
    }
}

pub(crate) fn ensure_class(conn: &Connection, class_id: i64) -> Result<()> {
    if !class_exists(conn, class_id)? {
        bail!("class not found");
    }
    Ok(())
}
