use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roster::{Candidate, Student};
use super::timestamp;

/// A committed selection inside the current session scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Session-local id, derived from the commit time in milliseconds.
    pub id: i64,
    pub student: Candidate,
    pub timestamp: DateTime<Utc>,
    pub class_name: String,
}

/// Body of `POST /roll-call`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewRollCall {
    pub student_id: i64,
    pub class_id: i64,
}

/// A roll-call record as stored by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRollCall {
    pub id: i64,
    pub student_id: i64,
    pub class_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub called_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
}
