use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Candidate, HistoryRecord};

/// Append-only list of committed selections for one session scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLedger {
    records: Vec<HistoryRecord>,
    #[serde(skip)]
    last_id: i64,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns it. Ids come from the commit time in
    /// milliseconds, bumped past the previous id when two commits share a
    /// millisecond.
    pub fn append(
        &mut self,
        student: Candidate,
        class_name: String,
        timestamp: DateTime<Utc>,
    ) -> &HistoryRecord {
        let id = timestamp.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        self.records.push(HistoryRecord {
            id,
            student,
            timestamp,
            class_name,
        });
        &self.records[self.records.len() - 1]
    }

    pub fn remove(&mut self, id: i64) -> Option<HistoryRecord> {
        let idx = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(idx))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryRecord> {
        self.records.iter().rev().take(n).cloned().collect()
    }
}
