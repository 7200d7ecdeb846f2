//! Roster data models shared with the REST collaborator.
//!
//! Field names follow the server's camelCase JSON. Nested collections are
//! optional on the wire and default to empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::timestamp;

/// Upper bound applied when coercing weights so a single mistyped value
/// cannot blow up the ticket sequence.
pub const MAX_WEIGHT: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    /// Display code (school number). Not guaranteed unique.
    #[serde(default)]
    pub student_id: String,
    pub name: String,
    #[serde(default = "default_weight", deserialize_with = "deserialize_weight")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Class {
    pub fn group(&self, group_id: i64) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub fn student_count(&self) -> usize {
        self.groups.iter().map(|group| group.students.len()).sum()
    }
}

/// A student eligible for selection, enriched with the owning group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub weight: u32,
    pub group_id: i64,
    pub group_name: String,
}

impl Candidate {
    pub fn from_student(student: &Student, group: &Group) -> Self {
        Self {
            id: student.id,
            student_id: student.student_id.clone(),
            name: student.name.clone(),
            weight: coerce_weight(f64::from(student.weight)),
            group_id: group.id,
            group_name: group.name.clone(),
        }
    }
}

/// Maps any incoming weight onto `1..=MAX_WEIGHT`.
///
/// Fractions truncate, and anything non-finite or below one becomes one so
/// every student keeps at least one ticket.
pub fn coerce_weight(raw: f64) -> u32 {
    if !raw.is_finite() || raw < 1.0 {
        return 1;
    }
    let truncated = raw.trunc();
    if truncated >= f64::from(MAX_WEIGHT) {
        MAX_WEIGHT
    } else {
        truncated as u32
    }
}

fn default_weight() -> u32 {
    1
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = match value {
        Some(serde_json::Value::Number(number)) => number.as_f64().unwrap_or(1.0),
        Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().unwrap_or(1.0),
        _ => 1.0,
    };
    Ok(coerce_weight(raw))
}
